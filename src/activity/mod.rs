//! Workflow activities and the rules that turn them into net fragments.
//!
//! Every activity is parsed once from the token queue and compiled once
//! into the shared [`PetriNet`]. A fragment owns the scope id that was
//! current when its `compile` started and names its places
//! `{scope}.internal.{suffix}`. Parents wire children in by merging
//! boundary places, never by holding on to handles.

use std::fmt;

use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{TokenStream, XAML_NS, qualify};

mod branch;
mod flowchart;
mod looping;
mod messaging;
mod parallel;
mod primitive;
mod registry;
mod sequence;
mod state_machine;

pub use branch::{If, Switch};
pub use flowchart::Flowchart;
pub use looping::{DoWhile, While};
pub use messaging::{Messaging, MessagingKind};
pub use parallel::{Parallel, Pick};
pub use primitive::{Atomic, Empty};
pub use registry::{Constructor, Registry};
pub use sequence::Sequence;
pub use state_machine::StateMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    /// Never resolves nested activities.
    Primitive,
    /// Resolves nested activities through the registry while parsing.
    Composite,
}

pub trait Activity: fmt::Debug {
    /// `{namespace}LocalName`, the registry key.
    fn qname(&self) -> String;

    fn local_name(&self) -> &str;

    fn kind(&self) -> ActivityKind;

    /// Consumes this activity's start tag, its content and its end tag.
    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error>;

    /// Builds the fragment for the scope id currently held by `net`.
    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError>;
}

/// Name space of one compiled fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope(usize);

impl Scope {
    #[must_use]
    pub fn current(net: &PetriNet) -> Self {
        Self(net.activity_count())
    }

    /// Takes the current scope and creates its boundary places.
    pub fn open(net: &mut PetriNet) -> Result<Self, NetError> {
        let scope = Self::current(net);
        net.internal_place(scope.initialized())?;
        net.internal_place(scope.closed())?;
        Ok(scope)
    }

    #[must_use]
    pub fn id(self) -> usize {
        self.0
    }

    #[must_use]
    pub fn name(self, suffix: &str) -> String {
        format!("{}.internal.{suffix}", self.0)
    }

    #[must_use]
    pub fn initialized(self) -> String {
        self.name("initialized")
    }

    #[must_use]
    pub fn closed(self) -> String {
        self.name("closed")
    }
}

/// Compiles `child` under a fresh scope and returns that scope.
pub fn compile_child(net: &mut PetriNet, child: &dyn Activity) -> Result<Scope, NetError> {
    let scope = Scope(net.next_scope());
    child.compile(net)?;
    Ok(scope)
}

/// Compiles `child` and splices it between two places by merging.
pub fn splice(
    net: &mut PetriNet,
    child: &dyn Activity,
    entry: &str,
    exit: &str,
) -> Result<Scope, NetError> {
    let scope = compile_child(net, child)?;
    net.merge(entry, &scope.initialized())?;
    net.merge(exit, &scope.closed())?;
    Ok(scope)
}

/// Returns the child, or a no-op activity in its place.
pub(crate) fn or_empty<'a>(child: Option<&'a (dyn Activity + 'static)>) -> &'a dyn Activity {
    child.unwrap_or(&Empty)
}

/// `{x:Reference id}` yields `id`; any other value is taken verbatim.
pub(crate) fn reference_id(value: &str) -> &str {
    value
        .strip_prefix('{')
        .and_then(|inner| inner.strip_suffix('}'))
        .and_then(|inner| inner.split_whitespace().nth(1))
        .unwrap_or(value)
}

/// Structural error for whatever tag sits at the front of `tokens`.
pub(crate) fn unexpected(tokens: &TokenStream, owner: &str) -> Error {
    let found = tokens
        .peek()
        .map_or_else(|| "end of input".to_string(), |t| t.qname().to_string());
    tokens.structural(format!("unexpected tag '{found}'"), owner)
}

pub(crate) fn x_name(local: &str) -> String {
    qualify(XAML_NS, local)
}

/// Consumes an `x:Reference` element and returns the id it points at.
pub(crate) fn parse_reference(tokens: &mut TokenStream, owner: &str) -> Result<String, Error> {
    let qname = x_name("Reference");
    let start = tokens.expect_start(&qname, owner)?;
    while !tokens.at_end_of(&qname) {
        tokens.skip_element(owner)?;
    }
    tokens.expect_end(&qname, owner)?;
    start
        .attribute("Reference")
        .map(|value| reference_id(value).to_string())
        .ok_or_else(|| tokens.structural("empty x:Reference", owner))
}

/// Parses an optional single activity wrapped in a property element such
/// as `If.Then`. An empty wrapper or an `x:Null` yields `None`.
pub(crate) fn parse_wrapped(
    tokens: &mut TokenStream,
    registry: &Registry,
    wrapper: &str,
    owner: &str,
) -> Result<Option<Box<dyn Activity>>, Error> {
    tokens.expect_start(wrapper, owner)?;
    let child = if tokens.at_end_of(wrapper) {
        None
    } else if tokens.at_start_of(&x_name("Null")) {
        tokens.skip_element(owner)?;
        None
    } else {
        Some(registry.parse_child(tokens, owner)?)
    };
    tokens.expect_end(wrapper, owner)?;
    Ok(child)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::{ACTIVITIES_NS, Token};

    /// Tokens for `<Local/>` in the activities namespace.
    pub(crate) fn leaf(local: &str) -> Vec<Token> {
        vec![
            Token::start(ACTIVITIES_NS, local),
            Token::end(ACTIVITIES_NS, local),
        ]
    }

    /// Tokens for `<Local>children</Local>` in the activities namespace.
    pub(crate) fn node(local: &str, children: Vec<Vec<Token>>) -> Vec<Token> {
        node_with(Token::start(ACTIVITIES_NS, local), children)
    }

    pub(crate) fn node_with(start: Token, children: Vec<Vec<Token>>) -> Vec<Token> {
        let end = Token::end(start.namespace(), start.local_name());
        let mut tokens = vec![start];
        tokens.extend(children.into_iter().flatten());
        tokens.push(end);
        tokens
    }

    /// Parses `tokens` as one activity and compiles it at scope 1 under a
    /// root boundary, the way the compiler driver does.
    pub(crate) fn compile_tokens(tokens: Vec<Token>) -> PetriNet {
        let registry = Registry::standard();
        let mut stream = TokenStream::from(tokens);
        let activity = registry.parse_child(&mut stream, "test").unwrap();
        assert!(stream.is_empty(), "unconsumed tokens: {stream:?}");

        let mut net = PetriNet::new();
        let root = Scope::open(&mut net).unwrap();
        splice(&mut net, activity.as_ref(), &root.initialized(), &root.closed()).unwrap();
        net
    }

    /// Names of the transitions leaving the place known as `place`.
    pub(crate) fn outgoing(net: &PetriNet, place: &str) -> Vec<String> {
        let place = net.place_by_name(place).unwrap();
        place
            .postset()
            .iter()
            .map(|t| net.transition(*t).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_scope_names() {
        let mut net = PetriNet::new();
        net.next_scope();
        net.next_scope();
        let scope = Scope::open(&mut net).unwrap();
        assert_eq!(scope.id(), 2);
        assert_eq!(scope.initialized(), "2.internal.initialized");
        assert_eq!(scope.name("condition"), "2.internal.condition");
        assert!(net.find("2.internal.closed").is_some());
    }

    #[test]
    fn test_reference_id() {
        assert_eq!(reference_id("{x:Reference __ReferenceID0}"), "__ReferenceID0");
        assert_eq!(reference_id("State1"), "State1");
    }
}
