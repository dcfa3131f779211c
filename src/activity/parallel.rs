use crate::activity::{
    Activity, ActivityKind, Empty, Registry, Scope, compile_child, or_empty, parse_wrapped, splice,
    unexpected,
};
use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{ACTIVITIES_NS, TokenStream, qualify};

/// AND-split and AND-join over all branches.
#[derive(Debug, Default)]
pub struct Parallel {
    branches: Vec<Box<dyn Activity>>,
}

impl Activity for Parallel {
    fn qname(&self) -> String {
        qualify(ACTIVITIES_NS, "Parallel")
    }

    fn local_name(&self) -> &str {
        "Parallel"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        let qname = self.qname();
        let completion = qualify(ACTIVITIES_NS, "Parallel.CompletionCondition");

        tokens.expect_start(&qname, "Parallel")?;
        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&completion) {
                tokens.skip_element("Parallel")?;
            } else {
                self.branches.push(registry.parse_child(tokens, "Parallel")?);
            }
        }
        tokens.expect_end(&qname, "Parallel")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let (initialized, closed) = (scope.initialized(), scope.closed());

        match self.branches.as_slice() {
            [] => {
                splice(net, &Empty, &initialized, &closed)?;
            }
            [single] => {
                splice(net, single.as_ref(), &initialized, &closed)?;
            }
            branches => {
                let split = net.new_transition(scope.name("split"))?;
                let join = net.new_transition(scope.name("join"))?;
                net.new_arc(&initialized, split)?;
                net.new_arc(join, &closed)?;
                for branch in branches {
                    let child = compile_child(net, branch.as_ref())?;
                    net.new_arc(split, &child.initialized())?;
                    net.new_arc(&child.closed(), join)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PickBranch {
    trigger: Option<Box<dyn Activity>>,
    action: Option<Box<dyn Activity>>,
}

/// Event-driven choice.
///
/// Every branch trigger starts from the shared `initialized` place, and
/// none of them disables the others.
#[derive(Debug, Default)]
pub struct Pick {
    branches: Vec<PickBranch>,
}

impl Pick {
    fn parse_branch(tokens: &mut TokenStream, registry: &Registry) -> Result<PickBranch, Error> {
        let qname = qualify(ACTIVITIES_NS, "PickBranch");
        let trigger = qualify(ACTIVITIES_NS, "PickBranch.Trigger");
        let action = qualify(ACTIVITIES_NS, "PickBranch.Action");

        tokens.expect_start(&qname, "Pick")?;
        let mut branch = PickBranch::default();
        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&trigger) {
                branch.trigger = parse_wrapped(tokens, registry, &trigger, "Pick")?;
            } else if branch.action.is_some() {
                return Err(unexpected(tokens, "Pick"));
            } else if tokens.at_start_of(&action) {
                branch.action = parse_wrapped(tokens, registry, &action, "Pick")?;
            } else {
                branch.action = Some(registry.parse_child(tokens, "Pick")?);
            }
        }
        tokens.expect_end(&qname, "Pick")?;
        Ok(branch)
    }
}

impl Activity for Pick {
    fn qname(&self) -> String {
        qualify(ACTIVITIES_NS, "Pick")
    }

    fn local_name(&self) -> &str {
        "Pick"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        let qname = self.qname();
        let branch = qualify(ACTIVITIES_NS, "PickBranch");

        tokens.expect_start(&qname, "Pick")?;
        while !tokens.at_end_of(&qname) {
            if !tokens.at_start_of(&branch) {
                return Err(unexpected(tokens, "Pick"));
            }
            self.branches.push(Self::parse_branch(tokens, registry)?);
        }
        tokens.expect_end(&qname, "Pick")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let (initialized, closed) = (scope.initialized(), scope.closed());
        if self.branches.is_empty() {
            splice(net, &Empty, &initialized, &closed)?;
            return Ok(());
        }

        for branch in &self.branches {
            let trigger = compile_child(net, or_empty(branch.trigger.as_deref()))?;
            net.merge(&initialized, &trigger.initialized())?;
            match &branch.action {
                Some(action) => {
                    let action = compile_child(net, action.as_ref())?;
                    net.merge(&trigger.closed(), &action.initialized())?;
                    net.merge(&closed, &action.closed())?;
                }
                None => {
                    net.merge(&closed, &trigger.closed())?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::tests::{compile_tokens, leaf, node, outgoing};

    #[test]
    fn test_parallel_split_join() {
        let net = compile_tokens(node(
            "Parallel",
            vec![
                node("Parallel.CompletionCondition", vec![leaf("InArgument")]),
                leaf("Assign"),
                leaf("Delay"),
            ],
        ));

        let split = net.find_transition("1.internal.split").unwrap();
        let join = net.find_transition("1.internal.join").unwrap();
        assert_eq!(net.transition(split).unwrap().postset().len(), 2);
        assert_eq!(net.transition(join).unwrap().preset().len(), 2);
        assert_eq!(outgoing(&net, "2.internal.closed"), ["1.internal.join"]);
        assert_eq!(outgoing(&net, "3.internal.closed"), ["1.internal.join"]);
    }

    #[test]
    fn test_parallel_single_branch_is_inlined() {
        let net = compile_tokens(node("Parallel", vec![leaf("Assign")]));
        assert!(net.find_transition("1.internal.split").is_none());
        assert_eq!(net.find("2.internal.initialized"), net.find("1.internal.initialized"));
    }

    #[test]
    fn test_empty_parallel_and_pick() {
        for local in ["Parallel", "Pick"] {
            let net = compile_tokens(leaf(local));
            let stats = net.statistics();
            assert_eq!((stats.places, stats.transitions), (2, 1), "{local}");
            assert_eq!(outgoing(&net, "1.internal.initialized"), ["2.internal.empty"]);
        }
    }

    #[test]
    fn test_pick_branches_race() {
        let net = compile_tokens(node(
            "Pick",
            vec![
                node(
                    "PickBranch",
                    vec![node("PickBranch.Trigger", vec![leaf("Delay")]), leaf("Assign")],
                ),
                node("PickBranch", vec![node("PickBranch.Trigger", vec![leaf("Delay")])]),
            ],
        ));

        assert_eq!(
            outgoing(&net, "1.internal.initialized"),
            ["2.internal.delay", "4.internal.delay"]
        );
        assert_eq!(net.find("2.internal.closed"), net.find("3.internal.initialized"));
        let closed = net.find("1.internal.closed");
        assert_eq!(net.find("3.internal.closed"), closed);
        assert_eq!(net.find("4.internal.closed"), closed);
    }

    #[test]
    fn test_pick_rejects_loose_activity() {
        let registry = Registry::standard();
        let mut stream = TokenStream::from(node("Pick", vec![leaf("Delay")]));
        assert!(matches!(
            registry.parse_child(&mut stream, "test"),
            Err(Error::Structural { .. })
        ));
    }
}
