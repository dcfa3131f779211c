use crate::activity::{Activity, ActivityKind, Registry, Scope};
use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{TokenStream, qualify};

/// An activity modelled as one internal step: `initialized -> label -> closed`.
///
/// Whatever the element contains (arguments, expressions) is skipped.
#[derive(Debug, Clone)]
pub struct Atomic {
    namespace: String,
    name: String,
    label: String,
}

impl Atomic {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            label: label.into(),
        }
    }
}

impl Activity for Atomic {
    fn qname(&self) -> String {
        qualify(&self.namespace, &self.name)
    }

    fn local_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Primitive
    }

    fn parse(&mut self, tokens: &mut TokenStream, _registry: &Registry) -> Result<(), Error> {
        let qname = self.qname();
        if !tokens.at_start_of(&qname) {
            return Err(tokens.structural(format!("expected '{qname}'"), &self.name));
        }
        tokens.skip_element(&self.name)?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        step(net, &self.label)
    }
}

/// The no-op activity. It has no markup and stands in for absent children.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Activity for Empty {
    fn qname(&self) -> String {
        "Empty".to_string()
    }

    fn local_name(&self) -> &str {
        "Empty"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Primitive
    }

    fn parse(&mut self, _tokens: &mut TokenStream, _registry: &Registry) -> Result<(), Error> {
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        step(net, "empty")
    }
}

fn step(net: &mut PetriNet, label: &str) -> Result<(), NetError> {
    let scope = Scope::open(net)?;
    let transition = net.new_transition(scope.name(label))?;
    net.new_arc(&scope.initialized(), transition)?;
    net.new_arc(transition, &scope.closed())?;
    Ok(())
}
