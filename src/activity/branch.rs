use crate::activity::{
    Activity, ActivityKind, Empty, Registry, Scope, compile_child, parse_wrapped, unexpected,
    x_name,
};
use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{ACTIVITIES_NS, TokenStream, qualify};

/// Binary choice on a condition that is not modelled.
///
/// `evalcondition` moves the token to `condition`; `initthen` and
/// `initelse` race from there. A missing branch leads straight to `closed`.
#[derive(Debug, Default)]
pub struct If {
    then: Option<Box<dyn Activity>>,
    otherwise: Option<Box<dyn Activity>>,
}

impl Activity for If {
    fn qname(&self) -> String {
        qualify(ACTIVITIES_NS, "If")
    }

    fn local_name(&self) -> &str {
        "If"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        let qname = self.qname();
        let then = qualify(ACTIVITIES_NS, "If.Then");
        let otherwise = qualify(ACTIVITIES_NS, "If.Else");
        let condition = qualify(ACTIVITIES_NS, "If.Condition");

        tokens.expect_start(&qname, "If")?;
        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&then) {
                self.then = parse_wrapped(tokens, registry, &then, "If")?;
            } else if tokens.at_start_of(&otherwise) {
                self.otherwise = parse_wrapped(tokens, registry, &otherwise, "If")?;
            } else if tokens.at_start_of(&condition) {
                tokens.skip_element("If")?;
            } else {
                return Err(unexpected(tokens, "If"));
            }
        }
        tokens.expect_end(&qname, "If")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let condition = scope.name("condition");
        net.internal_place(condition.clone())?;

        let eval = net.new_transition(scope.name("evalcondition"))?;
        net.new_arc(&scope.initialized(), eval)?;
        net.new_arc(eval, &condition)?;

        if self.then.is_none() && self.otherwise.is_none() {
            let finish = net.new_transition(scope.name("finish"))?;
            net.new_arc(&condition, finish)?;
            net.new_arc(finish, &scope.closed())?;
            return Ok(());
        }

        for (label, branch) in [("initthen", &self.then), ("initelse", &self.otherwise)] {
            let init = net.new_transition(scope.name(label))?;
            net.new_arc(&condition, init)?;
            match branch {
                Some(activity) => {
                    let child = compile_child(net, activity.as_ref())?;
                    net.new_arc(init, &child.initialized())?;
                    net.merge(&scope.closed(), &child.closed())?;
                }
                None => net.new_arc(init, &scope.closed())?,
            }
        }
        Ok(())
    }
}

/// Multi-way choice: cases are tried in order through a chain of
/// `case{i}` places, with `initdefault` taken when none matched.
#[derive(Debug, Default)]
pub struct Switch {
    cases: Vec<Box<dyn Activity>>,
    default: Option<Box<dyn Activity>>,
}

impl Activity for Switch {
    fn qname(&self) -> String {
        qualify(ACTIVITIES_NS, "Switch")
    }

    fn local_name(&self) -> &str {
        "Switch"
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        let qname = self.qname();
        let default = qualify(ACTIVITIES_NS, "Switch.Default");
        let expression = qualify(ACTIVITIES_NS, "Switch.Expression");
        let null = x_name("Null");

        tokens.expect_start(&qname, "Switch")?;
        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&default) {
                self.default = parse_wrapped(tokens, registry, &default, "Switch")?;
            } else if tokens.at_start_of(&expression) {
                tokens.skip_element("Switch")?;
            } else if tokens.at_start_of(&null) {
                tokens.skip_element("Switch")?;
                self.cases.push(Box::new(Empty));
            } else {
                self.cases.push(registry.parse_child(tokens, "Switch")?);
            }
        }
        tokens.expect_end(&qname, "Switch")?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let mut closings = Vec::with_capacity(self.cases.len() + 1);

        let mut last = scope.initialized();
        for (i, case) in self.cases.iter().enumerate() {
            let i = i + 1;
            let state = scope.name(&format!("case{i}"));
            net.internal_place(state.clone())?;

            let eval = net.new_transition(scope.name(&format!("evalcase{i}")))?;
            let init = net.new_transition(scope.name(&format!("initcase{i}")))?;
            net.new_arc(&last, eval)?;
            net.new_arc(eval, &state)?;
            net.new_arc(&state, init)?;

            let child = compile_child(net, case.as_ref())?;
            net.new_arc(init, &child.initialized())?;
            closings.push(child.closed());
            last = state;
        }

        let init_default = net.new_transition(scope.name("initdefault"))?;
        net.new_arc(&last, init_default)?;
        match &self.default {
            Some(default) => {
                let child = compile_child(net, default.as_ref())?;
                net.new_arc(init_default, &child.initialized())?;
                closings.push(child.closed());
            }
            None => net.new_arc(init_default, &scope.closed())?,
        }

        for closed in closings {
            net.merge(&scope.closed(), &closed)?;
        }
        Ok(())
    }
}
