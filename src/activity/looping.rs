use crate::activity::{Activity, ActivityKind, Registry, Scope, compile_child, parse_wrapped};
use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{ACTIVITIES_NS, TokenStream, qualify};

/// Pre-tested loop. The condition is evaluated from `initialized`, and the
/// body hands control back to `initialized` when it closes.
#[derive(Debug, Default)]
pub struct While {
    body: Option<Box<dyn Activity>>,
}

/// Post-tested loop. The body runs from `initialized` first, and the
/// condition decides between `repeatactivity` and `enddowhile`.
#[derive(Debug, Default)]
pub struct DoWhile {
    body: Option<Box<dyn Activity>>,
}

impl Activity for While {
    fn qname(&self) -> String {
        qualify(ACTIVITIES_NS, "While")
    }

    fn local_name(&self) -> &str {
        "While"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        self.body = parse_loop(tokens, registry, "While")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let condition = scope.name("condition");
        net.internal_place(condition.clone())?;

        let eval = net.new_transition(scope.name("evalcondition"))?;
        let init = net.new_transition(scope.name("initactivity"))?;
        let end = net.new_transition(scope.name("endwhile"))?;
        net.new_arc(&scope.initialized(), eval)?;
        net.new_arc(eval, &condition)?;
        net.new_arc(&condition, init)?;
        net.new_arc(&condition, end)?;
        net.new_arc(end, &scope.closed())?;

        match &self.body {
            Some(body) => {
                let child = compile_child(net, body.as_ref())?;
                net.new_arc(init, &child.initialized())?;
                net.merge(&scope.initialized(), &child.closed())?;
            }
            None => net.new_arc(init, &scope.initialized())?,
        }
        Ok(())
    }
}

impl Activity for DoWhile {
    fn qname(&self) -> String {
        qualify(ACTIVITIES_NS, "DoWhile")
    }

    fn local_name(&self) -> &str {
        "DoWhile"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        self.body = parse_loop(tokens, registry, "DoWhile")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let condition = scope.name("condition");
        net.internal_place(condition.clone())?;

        let eval = net.new_transition(scope.name("evalcondition"))?;
        let repeat = net.new_transition(scope.name("repeatactivity"))?;
        let end = net.new_transition(scope.name("enddowhile"))?;
        net.new_arc(eval, &condition)?;
        net.new_arc(&condition, repeat)?;
        net.new_arc(repeat, &scope.initialized())?;
        net.new_arc(&condition, end)?;
        net.new_arc(end, &scope.closed())?;

        match &self.body {
            Some(body) => {
                let child = compile_child(net, body.as_ref())?;
                net.new_arc(&child.closed(), eval)?;
                net.merge(&scope.initialized(), &child.initialized())?;
            }
            None => net.new_arc(&scope.initialized(), eval)?,
        }
        Ok(())
    }
}

/// Shared grammar of both loops: a skipped `{Loop}.Condition`, and one body
/// given either directly or inside `{Loop}.Body`.
fn parse_loop(
    tokens: &mut TokenStream,
    registry: &Registry,
    local: &str,
) -> Result<Option<Box<dyn Activity>>, Error> {
    let qname = qualify(ACTIVITIES_NS, local);
    let condition = qualify(ACTIVITIES_NS, &format!("{local}.Condition"));
    let wrapper = qualify(ACTIVITIES_NS, &format!("{local}.Body"));

    tokens.expect_start(&qname, local)?;
    let mut body = None;
    while !tokens.at_end_of(&qname) {
        if tokens.at_start_of(&condition) {
            tokens.skip_element(local)?;
            continue;
        }
        if body.is_some() {
            return Err(tokens.structural("more than one loop body", local));
        }
        body = if tokens.at_start_of(&wrapper) {
            parse_wrapped(tokens, registry, &wrapper, local)?
        } else {
            Some(registry.parse_child(tokens, local)?)
        };
    }
    tokens.expect_end(&qname, local)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::tests::{compile_tokens, leaf, node, outgoing};

    #[test]
    fn test_while_returns_to_condition() {
        let net = compile_tokens(node(
            "While",
            vec![node("While.Condition", vec![leaf("InArgument")]), leaf("Assign")],
        ));

        assert_eq!(
            outgoing(&net, "1.internal.condition"),
            ["1.internal.initactivity", "1.internal.endwhile"]
        );
        assert_eq!(net.find("2.internal.closed"), net.find("1.internal.initialized"));
        let init = net.find_transition("1.internal.initactivity").unwrap();
        let body = net.find("2.internal.initialized").unwrap();
        assert!(net.transition(init).unwrap().postset().contains(&body));
    }

    #[test]
    fn test_while_without_body() {
        let net = compile_tokens(leaf("While"));
        let start = net.find("1.internal.initialized").unwrap();
        let init = net.find_transition("1.internal.initactivity").unwrap();
        assert!(net.transition(init).unwrap().postset().contains(&start));
    }

    #[test]
    fn test_do_while_runs_body_first() {
        let net = compile_tokens(node("DoWhile", vec![leaf("Assign")]));

        assert_eq!(outgoing(&net, "1.internal.initialized"), ["2.internal.assign"]);
        assert_eq!(outgoing(&net, "2.internal.closed"), ["1.internal.evalcondition"]);
        let repeat = net.find_transition("1.internal.repeatactivity").unwrap();
        let start = net.find("1.internal.initialized").unwrap();
        assert!(net.transition(repeat).unwrap().postset().contains(&start));
    }

    #[test]
    fn test_loop_rejects_two_bodies() {
        let registry = Registry::standard();
        let mut stream = TokenStream::from(node("While", vec![leaf("Assign"), leaf("Delay")]));
        assert!(matches!(
            registry.parse_child(&mut stream, "test"),
            Err(Error::Structural { .. })
        ));
    }
}
