use crate::activity::{Activity, ActivityKind, Empty, Registry, Scope, compile_child, splice};
use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{ACTIVITIES_NS, TokenStream, qualify};

/// Runs its children one after another.
///
/// Each child's `closed` place is merged with the next child's
/// `initialized` place, so no transition sits between them.
#[derive(Debug, Default)]
pub struct Sequence {
    activities: Vec<Box<dyn Activity>>,
}

impl Activity for Sequence {
    fn qname(&self) -> String {
        qualify(ACTIVITIES_NS, "Sequence")
    }

    fn local_name(&self) -> &str {
        "Sequence"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        let qname = self.qname();
        tokens.expect_start(&qname, "Sequence")?;
        while !tokens.at_end_of(&qname) {
            self.activities.push(registry.parse_child(tokens, "Sequence")?);
        }
        tokens.expect_end(&qname, "Sequence")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        if self.activities.is_empty() {
            splice(net, &Empty, &scope.initialized(), &scope.closed())?;
            return Ok(());
        }

        let mut last = scope.initialized();
        for activity in &self.activities {
            let child = compile_child(net, activity.as_ref())?;
            net.merge(&last, &child.initialized())?;
            last = child.closed();
        }
        net.merge(&scope.closed(), &last)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::activity::tests::{compile_tokens, leaf, node, outgoing};

    #[test]
    fn test_sequence_chains_children() {
        let net = compile_tokens(node("Sequence", vec![leaf("Assign"), leaf("Delay")]));

        assert_eq!(outgoing(&net, "0.internal.initialized"), ["2.internal.assign"]);
        assert_eq!(outgoing(&net, "2.internal.closed"), ["3.internal.delay"]);
        assert_eq!(net.find("2.internal.closed"), net.find("3.internal.initialized"));
        assert_eq!(net.find("0.internal.closed"), net.find("3.internal.closed"));

        let stats = net.statistics();
        assert_eq!((stats.places, stats.transitions, stats.arcs), (3, 2, 4));
    }

    #[test]
    fn test_empty_sequence_is_one_step() {
        let net = compile_tokens(leaf("Sequence"));

        let stats = net.statistics();
        assert_eq!((stats.places, stats.transitions, stats.arcs), (2, 1, 2));
        assert_eq!(outgoing(&net, "1.internal.initialized"), ["2.internal.empty"]);
        assert_eq!(outgoing(&net, "1.internal.closed"), Vec::<String>::new());
    }

    #[test]
    fn test_nested_sequences() {
        let net = compile_tokens(node(
            "Sequence",
            vec![node("Sequence", vec![leaf("Assign")]), leaf("Assign")],
        ));
        assert_eq!(net.statistics().places, 3);
        assert_eq!(net.find("3.internal.closed"), net.find("4.internal.initialized"));
    }
}
