//! Activities registered from outside the crate take part in compilation
//! like the built-in ones.

use wfnet::activity::{Activity, ActivityKind, Registry, Scope};
use wfnet::parser::{TokenStream, qualify};
use wfnet::{CommunicationType, Error, NetError, PetriNet, compile_source};

const CUSTOM_NS: &str = "clr-namespace:Custom.Activities;assembly=Custom";

/// Waits for user input through its own interface place.
#[derive(Debug, Default)]
struct Prompt;

impl Activity for Prompt {
    fn qname(&self) -> String {
        qualify(CUSTOM_NS, "Prompt")
    }

    fn local_name(&self) -> &str {
        "Prompt"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Primitive
    }

    fn parse(&mut self, tokens: &mut TokenStream, _registry: &Registry) -> Result<(), Error> {
        tokens.skip_element("Prompt")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let message = format!("in.{}.prompt", scope.id());
        net.new_place(message.clone(), CommunicationType::Input)?;

        let receive = net.new_transition_of(scope.name("receive"), CommunicationType::Input)?;
        net.new_arc(&scope.initialized(), receive)?;
        net.new_arc(receive, &scope.closed())?;
        net.new_arc(&message, receive)
    }
}

const SOURCE: &str = r#"<Activity xmlns="http://schemas.microsoft.com/netfx/2009/xaml/activities"
    xmlns:c="clr-namespace:Custom.Activities;assembly=Custom">
  <Sequence>
    <c:Prompt Text="Name?" />
    <WriteLine />
  </Sequence>
</Activity>"#;

#[test]
fn test_custom_activity() {
    let mut registry = Registry::standard();
    assert!(registry.register(qualify(CUSTOM_NS, "Prompt"), || Box::new(Prompt)));

    let net = compile_source(SOURCE, &registry).unwrap();
    let prompt = net.place_by_name("in.2.prompt").unwrap();
    assert_eq!(prompt.kind(), CommunicationType::Input);
    assert_eq!(net.statistics().input_places, 1);
    assert!(net.find_transition("3.internal.writeline").is_some());
}

#[test]
fn test_first_registration_wins() {
    let mut registry = Registry::new();
    assert!(registry.register(qualify(CUSTOM_NS, "Prompt"), || Box::new(Prompt)));
    assert!(!registry.register(qualify(CUSTOM_NS, "Prompt"), || Box::<Prompt>::default()));
    assert_eq!(registry.qnames().count(), 1);
}

#[test]
fn test_unregistered_custom_activity() {
    let result = compile_source(SOURCE, &Registry::standard());
    let Err(Error::Resolution { qname, activity, .. }) = result else {
        panic!("expected a resolution error");
    };
    assert_eq!(qname, qualify(CUSTOM_NS, "Prompt"));
    assert_eq!(activity, "Sequence");
}
