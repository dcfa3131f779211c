use std::collections::HashSet;

use indexmap::IndexMap;

use crate::activity::{
    Activity, ActivityKind, Registry, Scope, parse_reference, parse_wrapped, reference_id, splice,
    unexpected, x_name,
};
use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{ACTIVITIES_NS, TokenStream, qualify};

const NAME: &str = "StateMachine";

#[derive(Debug)]
struct StateTransition {
    to: String,
    trigger: Option<String>,
    guarded: bool,
    action: Option<Box<dyn Activity>>,
}

#[derive(Debug)]
struct State {
    id: String,
    is_final: bool,
    entry: Option<Box<dyn Activity>>,
    exit: Option<Box<dyn Activity>>,
    transitions: Vec<StateTransition>,
}

/// One outgoing transition as seen by a guard chain: its 1-based position
/// in the state and whether it carries a condition.
type Branch = (usize, bool);

/// States with entry and exit activities, connected by guarded transitions
/// that wait on shared triggers.
#[derive(Debug, Default)]
pub struct StateMachine {
    initial: Option<String>,
    states: Vec<State>,
    triggers: IndexMap<String, Option<Box<dyn Activity>>>,
    generated: usize,
}

impl StateMachine {
    fn qname(local: &str) -> String {
        qualify(ACTIVITIES_NS, local)
    }

    fn generate(&mut self, kind: &str) -> String {
        self.generated += 1;
        format!("__{kind}{}", self.generated)
    }

    /// Parses an inline state or a reference to one and returns its id.
    fn parse_state(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
    ) -> Result<String, Error> {
        if tokens.at_start_of(&x_name("Reference")) {
            return parse_reference(tokens, NAME);
        }

        let qname = Self::qname("State");
        let entry_tag = Self::qname("State.Entry");
        let exit_tag = Self::qname("State.Exit");
        let transitions_tag = Self::qname("State.Transitions");

        let start = tokens.expect_start(&qname, NAME)?;
        let id = match start.attribute("x:Name") {
            Some(name) => name.to_string(),
            None => self.generate("state"),
        };
        let is_final = start
            .attribute("IsFinal")
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        let mut state = State {
            id: id.clone(),
            is_final,
            entry: None,
            exit: None,
            transitions: vec![],
        };
        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&entry_tag) {
                state.entry = parse_wrapped(tokens, registry, &entry_tag, NAME)?;
            } else if tokens.at_start_of(&exit_tag) {
                state.exit = parse_wrapped(tokens, registry, &exit_tag, NAME)?;
            } else if tokens.at_start_of(&transitions_tag) {
                tokens.next_token(NAME)?;
                while !tokens.at_end_of(&transitions_tag) {
                    let transition = self.parse_transition(tokens, registry)?;
                    state.transitions.push(transition);
                }
                tokens.expect_end(&transitions_tag, NAME)?;
            } else {
                return Err(unexpected(tokens, NAME));
            }
        }
        tokens.expect_end(&qname, NAME)?;

        self.states.push(state);
        Ok(id)
    }

    fn parse_transition(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
    ) -> Result<StateTransition, Error> {
        let qname = Self::qname("Transition");
        let trigger_tag = Self::qname("Transition.Trigger");
        let condition_tag = Self::qname("Transition.Condition");
        let to_tag = Self::qname("Transition.To");
        let action_tag = Self::qname("Transition.Action");

        let start = tokens.expect_start(&qname, NAME)?;
        let mut to = start.attribute("To").map(|r| reference_id(r).to_string());
        let mut trigger = start.attribute("Trigger").map(|r| reference_id(r).to_string());
        let mut guarded = start.attribute("Condition").is_some();
        let mut action = None;

        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&trigger_tag) {
                trigger = self.parse_trigger(tokens, registry, &trigger_tag)?;
            } else if tokens.at_start_of(&condition_tag) {
                tokens.skip_element(NAME)?;
                guarded = true;
            } else if tokens.at_start_of(&to_tag) {
                tokens.next_token(NAME)?;
                if !tokens.at_end_of(&to_tag) {
                    to = Some(self.parse_state(tokens, registry)?);
                }
                tokens.expect_end(&to_tag, NAME)?;
            } else if tokens.at_start_of(&action_tag) {
                action = parse_wrapped(tokens, registry, &action_tag, NAME)?;
            } else {
                return Err(unexpected(tokens, NAME));
            }
        }
        tokens.expect_end(&qname, NAME)?;

        if let Some(key) = &trigger {
            self.triggers.entry(key.clone()).or_default();
        }
        let to = to.ok_or_else(|| tokens.structural("transition without a target state", NAME))?;
        Ok(StateTransition {
            to,
            trigger,
            guarded,
            action,
        })
    }

    /// Reads a `Transition.Trigger` element and returns the trigger key.
    /// Inline triggers are keyed by their `x:Name`.
    fn parse_trigger(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
        wrapper: &str,
    ) -> Result<Option<String>, Error> {
        tokens.expect_start(wrapper, NAME)?;
        let key = if tokens.at_end_of(wrapper) {
            None
        } else if tokens.at_start_of(&x_name("Null")) {
            tokens.skip_element(NAME)?;
            None
        } else if tokens.at_start_of(&x_name("Reference")) {
            Some(parse_reference(tokens, NAME)?)
        } else {
            let key = match tokens.peek_start(NAME)?.attribute("x:Name") {
                Some(name) => name.to_string(),
                None => self.generate("trigger"),
            };
            let activity = registry.parse_child(tokens, NAME)?;
            self.triggers.insert(key.clone(), Some(activity));
            Some(key)
        };
        tokens.expect_end(wrapper, NAME)?;
        Ok(key)
    }

    fn check_references(&self, tokens: &TokenStream) -> Result<(), Error> {
        if self.states.is_empty() {
            return Err(tokens.structural("state machine without states", NAME));
        }

        let mut known = HashSet::new();
        for state in &self.states {
            if !known.insert(state.id.as_str()) {
                return Err(tokens.structural(format!("duplicate state '{}'", state.id), NAME));
            }
        }

        match &self.initial {
            None => return Err(tokens.structural("missing initial state", NAME)),
            Some(initial) if !known.contains(initial.as_str()) => {
                return Err(tokens.structural(format!("unknown initial state '{initial}'"), NAME));
            }
            Some(_) => {}
        }

        for state in &self.states {
            for transition in &state.transitions {
                if !known.contains(transition.to.as_str()) {
                    return Err(tokens.structural(
                        format!("unknown target state '{}' in '{}'", transition.to, state.id),
                        NAME,
                    ));
                }
            }
            if state.is_final && !state.transitions.is_empty() {
                log::warn!("final state '{}' has outgoing transitions, ignoring them", state.id);
            }
        }

        for (key, activity) in &self.triggers {
            if activity.is_none() {
                return Err(tokens.structural(format!("unknown trigger '{key}'"), NAME));
            }
        }
        Ok(())
    }

    fn compile_state(
        &self,
        net: &mut PetriNet,
        scope: Scope,
        state: &State,
    ) -> Result<(), NetError> {
        let prefix = scope.name(&state.id);
        let name = |suffix: &str| format!("{prefix}.{suffix}");

        net.internal_place(name("initialized"))?;
        let entry_done = match &state.entry {
            Some(entry) => {
                let (init, done) = (name("entry.initialized"), name("entry.closed"));
                net.internal_place(init.clone())?;
                net.internal_place(done.clone())?;
                splice(net, entry.as_ref(), &init, &done)?;
                net.merge(&name("initialized"), &init)?;
                done
            }
            None => name("initialized"),
        };

        if state.is_final {
            net.internal_place(name("closed"))?;
            net.merge(&entry_done, &name("closed"))?;
            return Ok(());
        }

        let (exit_in, exit_out) = match &state.exit {
            Some(exit) => {
                let (init, done) = (name("exit.initialized"), name("exit.closed"));
                net.internal_place(init.clone())?;
                net.internal_place(done.clone())?;
                splice(net, exit.as_ref(), &init, &done)?;
                (init, done)
            }
            None => {
                net.internal_place(name("exit"))?;
                (name("exit"), name("exit"))
            }
        };

        for (i, transition) in state.transitions.iter().enumerate() {
            let i = i + 1;
            let action_init = name(&format!("t{i}.action.initialized"));
            net.internal_place(action_init.clone())?;
            let action_done = match &transition.action {
                Some(action) => {
                    let done = name(&format!("t{i}.action.closed"));
                    net.internal_place(done.clone())?;
                    splice(net, action.as_ref(), &action_init, &done)?;
                    done
                }
                None => action_init,
            };

            let wait = name(&format!("t{i}.wait"));
            let to = name(&format!("to{i}.{}", transition.to));
            net.internal_place(wait.clone())?;
            net.internal_place(to.clone())?;

            let split = net.new_transition(name(&format!("t{i}.split")))?;
            let leave = net.new_transition(name(&format!("t{i}")))?;
            net.new_arc(&action_done, split)?;
            net.new_arc(split, &exit_in)?;
            net.new_arc(split, &wait)?;
            net.new_arc(&wait, leave)?;
            net.new_arc(&exit_out, leave)?;
            net.new_arc(leave, &to)?;
        }

        let mut by_trigger: IndexMap<&str, Vec<Branch>> = IndexMap::new();
        let mut untriggered = vec![];
        for (i, transition) in state.transitions.iter().enumerate() {
            let branch = (i + 1, transition.guarded);
            match transition.trigger.as_deref() {
                Some(key) => by_trigger.entry(key).or_default().push(branch),
                None => untriggered.push(branch),
            }
        }

        // Each state waits on its own copy of a shared trigger.
        for (key, branches) in by_trigger {
            let trigger_in = name(&format!("trigger.{key}.in"));
            let trigger_out = name(&format!("trigger.{key}.out"));
            net.internal_place(trigger_in.clone())?;
            net.internal_place(trigger_out.clone())?;
            if let Some(Some(activity)) = self.triggers.get(key) {
                splice(net, activity.as_ref(), &trigger_in, &trigger_out)?;
            }
            net.merge(&entry_done, &trigger_in)?;

            let chain = GuardChain {
                state: &prefix,
                label: key,
                waiting: &trigger_in,
            };
            chain.compile(net, &trigger_out, &name(&format!("ontrigger.{key}")), &branches)?;
        }

        if !untriggered.is_empty() {
            let trigger = name("trigger");
            net.internal_place(trigger.clone())?;
            net.merge(&entry_done, &trigger)?;

            let chain = GuardChain {
                state: &prefix,
                label: "notrigger",
                waiting: &trigger,
            };
            chain.compile(net, &trigger, &name("onemptytrigger"), &untriggered)?;
        }
        Ok(())
    }
}

/// Sequential guard evaluation of the transitions that share one trigger.
///
/// Each guarded transition gets `eval -> condition`, then either starts
/// its action or falls through with `wrong` to the next candidate. The
/// last `wrong` puts the token back in `waiting`.
struct GuardChain<'a> {
    state: &'a str,
    label: &'a str,
    waiting: &'a str,
}

impl GuardChain<'_> {
    fn name(&self, suffix: &str) -> String {
        format!("{}.{}.{suffix}", self.state, self.label)
    }

    fn compile(
        &self,
        net: &mut PetriNet,
        fired: &str,
        on: &str,
        branches: &[Branch],
    ) -> Result<(), NetError> {
        let on = net.new_transition(on)?;
        let mut last = self.name("runcondition1");
        net.internal_place(last.clone())?;
        net.new_arc(fired, on)?;
        net.new_arc(on, &last)?;

        for (k, &(index, guarded)) in branches.iter().enumerate() {
            let k = k + 1;
            let start = net.new_transition(self.name(&format!("start{k}")))?;
            let action = format!("{}.t{index}.action.initialized", self.state);

            if guarded {
                let eval = net.new_transition(self.name(&format!("eval{k}")))?;
                let condition = self.name(&format!("condition{k}"));
                let wrong = net.new_transition(self.name(&format!("wrong{k}")))?;
                net.internal_place(condition.clone())?;
                net.new_arc(&last, eval)?;
                net.new_arc(eval, &condition)?;
                net.new_arc(&condition, wrong)?;
                net.new_arc(&condition, start)?;

                if k == branches.len() {
                    net.new_arc(wrong, self.waiting)?;
                } else {
                    last = self.name(&format!("runcondition{}", k + 1));
                    net.internal_place(last.clone())?;
                    net.new_arc(wrong, &last)?;
                }
            } else {
                net.new_arc(&last, start)?;
            }
            net.new_arc(start, &action)?;
        }
        Ok(())
    }
}

impl Activity for StateMachine {
    fn qname(&self) -> String {
        Self::qname(NAME)
    }

    fn local_name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> ActivityKind {
        ActivityKind::Composite
    }

    fn parse(&mut self, tokens: &mut TokenStream, registry: &Registry) -> Result<(), Error> {
        let qname = Self::qname(NAME);
        let initial_tag = Self::qname("StateMachine.InitialState");
        let states_tag = Self::qname("StateMachine.States");

        let root = tokens.expect_start(&qname, NAME)?;
        self.initial = root
            .attribute("InitialState")
            .map(|r| reference_id(r).to_string());

        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&initial_tag) {
                tokens.next_token(NAME)?;
                while !tokens.at_end_of(&initial_tag) {
                    let id = self.parse_state(tokens, registry)?;
                    self.initial.get_or_insert(id);
                }
                tokens.expect_end(&initial_tag, NAME)?;
            } else if tokens.at_start_of(&states_tag) {
                tokens.next_token(NAME)?;
                while !tokens.at_end_of(&states_tag) {
                    self.parse_state(tokens, registry)?;
                }
                tokens.expect_end(&states_tag, NAME)?;
            } else if tokens.at_start_of(&Self::qname("State"))
                || tokens.at_start_of(&x_name("Reference"))
            {
                self.parse_state(tokens, registry)?;
            } else {
                return Err(unexpected(tokens, NAME));
            }
        }

        self.check_references(tokens)?;
        tokens.expect_end(&qname, NAME)?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let state_place = |id: &str, suffix: &str| scope.name(&format!("{id}.{suffix}"));

        for state in &self.states {
            self.compile_state(net, scope, state)?;
        }

        if let Some(initial) = &self.initial {
            net.merge(&scope.initialized(), &state_place(initial, "initialized"))?;
        }
        for state in self.states.iter().filter(|state| state.is_final) {
            net.merge(&scope.closed(), &state_place(&state.id, "closed"))?;
        }
        for state in self.states.iter().filter(|state| !state.is_final) {
            for (i, transition) in state.transitions.iter().enumerate() {
                let to = state_place(&state.id, &format!("to{}.{}", i + 1, transition.to));
                net.merge(&to, &state_place(&transition.to, "initialized"))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::tests::{compile_tokens, leaf, node, node_with, outgoing};
    use crate::parser::{Token, XAML_NS};

    fn state(name: &str, children: Vec<Vec<Token>>) -> Vec<Token> {
        node_with(
            Token::start(ACTIVITIES_NS, "State").with_attribute("x:Name", name),
            children,
        )
    }

    fn final_state(name: &str) -> Vec<Token> {
        node_with(
            Token::start(ACTIVITIES_NS, "State")
                .with_attribute("x:Name", name)
                .with_attribute("IsFinal", "True"),
            vec![],
        )
    }

    fn transition(to: &str, children: Vec<Vec<Token>>) -> Vec<Token> {
        node_with(
            Token::start(ACTIVITIES_NS, "Transition")
                .with_attribute("To", format!("{{x:Reference {to}}}")),
            children,
        )
    }

    fn machine(initial: &str, states: Vec<Vec<Token>>) -> Vec<Token> {
        node_with(
            Token::start(ACTIVITIES_NS, "StateMachine")
                .with_attribute("InitialState", format!("{{x:Reference {initial}}}")),
            vec![node("StateMachine.States", states)],
        )
    }

    #[test]
    fn test_single_triggered_transition() {
        let trigger = node("Transition.Trigger", vec![leaf("Delay")]);
        let net = compile_tokens(machine(
            "s1",
            vec![
                state(
                    "s1",
                    vec![node("State.Transitions", vec![transition("s2", vec![trigger])])],
                ),
                final_state("s2"),
            ],
        ));

        let initialized = net.find("1.internal.s1.initialized");
        assert_eq!(initialized, net.find("1.internal.initialized"));
        assert_eq!(initialized, net.find("1.internal.s1.trigger.__trigger1.in"));
        assert_eq!(outgoing(&net, "1.internal.s1.initialized"), ["2.internal.delay"]);
        assert_eq!(
            outgoing(&net, "1.internal.s1.trigger.__trigger1.out"),
            ["1.internal.s1.ontrigger.__trigger1"]
        );
        assert_eq!(
            outgoing(&net, "1.internal.s1.t1.action.initialized"),
            ["1.internal.s1.t1.split"]
        );

        let target = net.find("1.internal.s2.initialized");
        assert_eq!(net.find("1.internal.s1.to1.s2"), target);
        assert_eq!(net.find("1.internal.s2.closed"), target);
        assert_eq!(net.find("1.internal.closed"), target);
    }

    #[test]
    fn test_guard_chain_falls_back_to_trigger() {
        let guarded = |to: &str| {
            transition(
                to,
                vec![
                    trigger_reference("tick"),
                    node("Transition.Condition", vec![leaf("InArgument")]),
                ],
            )
        };
        let first = transition(
            "s2",
            vec![
                node(
                    "Transition.Trigger",
                    vec![node_with(
                        Token::start(ACTIVITIES_NS, "Delay").with_attribute("x:Name", "tick"),
                        vec![],
                    )],
                ),
                node("Transition.Condition", vec![leaf("InArgument")]),
            ],
        );
        let net = compile_tokens(machine(
            "s1",
            vec![
                state(
                    "s1",
                    vec![node("State.Transitions", vec![first, guarded("s2")])],
                ),
                final_state("s2"),
            ],
        ));

        assert_eq!(
            outgoing(&net, "1.internal.s1.tick.condition1"),
            ["1.internal.s1.tick.wrong1", "1.internal.s1.tick.start1"]
        );
        let wrong = net.find_transition("1.internal.s1.tick.wrong2").unwrap();
        let back = net.transition(wrong).unwrap().postset()[0];
        assert_eq!(Some(back), net.find("1.internal.s1.trigger.tick.in"));
        assert_eq!(net.find_transition("1.internal.s1.onemptytrigger"), None);
    }

    #[test]
    fn test_untriggered_transition_with_exit() {
        let net = compile_tokens(machine(
            "a",
            vec![
                state(
                    "a",
                    vec![
                        node("State.Entry", vec![leaf("Assign")]),
                        node("State.Exit", vec![leaf("WriteLine")]),
                        node("State.Transitions", vec![transition("b", vec![])]),
                    ],
                ),
                final_state("b"),
            ],
        ));

        assert_eq!(outgoing(&net, "1.internal.a.initialized"), ["2.internal.assign"]);
        assert_eq!(net.find("1.internal.a.entry.closed"), net.find("1.internal.a.trigger"));
        assert_eq!(
            outgoing(&net, "1.internal.a.trigger"),
            ["1.internal.a.onemptytrigger"]
        );
        assert_eq!(
            outgoing(&net, "1.internal.a.exit.closed"),
            ["1.internal.a.t1"]
        );
    }

    #[test]
    fn test_inline_target_state() {
        let to = node("Transition.To", vec![final_state("done")]);
        let initial = node(
            "StateMachine.InitialState",
            vec![state(
                "start",
                vec![node("State.Transitions", vec![node("Transition", vec![to])])],
            )],
        );
        let net = compile_tokens(node("StateMachine", vec![initial]));

        assert_eq!(net.find("1.internal.start.initialized"), net.find("1.internal.initialized"));
        assert_eq!(net.find("1.internal.start.to1.done"), net.find("1.internal.closed"));
    }

    #[test]
    fn test_unknown_target_state() {
        let registry = Registry::standard();
        let tokens = machine(
            "s1",
            vec![state(
                "s1",
                vec![node("State.Transitions", vec![transition("nowhere", vec![])])],
            )],
        );
        let mut stream = TokenStream::from(tokens);
        assert!(matches!(
            registry.parse_child(&mut stream, "test"),
            Err(Error::Structural { .. })
        ));
    }

    fn trigger_reference(key: &str) -> Vec<Token> {
        node(
            "Transition.Trigger",
            vec![vec![
                Token::start(XAML_NS, "Reference").with_attribute("Reference", key),
                Token::end(XAML_NS, "Reference"),
            ]],
        )
    }

    #[test]
    fn test_shared_trigger_keeps_states_apart() {
        let tick = node(
            "Transition.Trigger",
            vec![node_with(
                Token::start(ACTIVITIES_NS, "Delay").with_attribute("x:Name", "tick"),
                vec![],
            )],
        );
        let net = compile_tokens(machine(
            "a",
            vec![
                state("a", vec![node("State.Transitions", vec![transition("b", vec![tick])])]),
                state(
                    "b",
                    vec![node(
                        "State.Transitions",
                        vec![transition("c", vec![trigger_reference("tick")])],
                    )],
                ),
                final_state("c"),
            ],
        ));

        let a = net.find("1.internal.a.initialized");
        let b = net.find("1.internal.b.initialized");
        assert_ne!(a, b);
        assert_eq!(net.find("1.internal.a.trigger.tick.in"), a);
        assert_eq!(net.find("1.internal.b.trigger.tick.in"), b);
        assert_eq!(outgoing(&net, "1.internal.a.initialized"), ["2.internal.delay"]);
        assert_eq!(outgoing(&net, "1.internal.b.initialized"), ["3.internal.delay"]);
        assert_eq!(
            outgoing(&net, "1.internal.b.trigger.tick.out"),
            ["1.internal.b.ontrigger.tick"]
        );
        assert_eq!(net.find("1.internal.a.to1.b"), b);
        assert!(net.validate().is_ok());
    }

    #[test]
    fn test_unknown_trigger_reference() {
        let registry = Registry::standard();
        let tokens = machine(
            "s1",
            vec![
                state(
                    "s1",
                    vec![node(
                        "State.Transitions",
                        vec![transition("s2", vec![trigger_reference("nowhere")])],
                    )],
                ),
                final_state("s2"),
            ],
        );
        let mut stream = TokenStream::from(tokens);
        let Err(Error::Structural { message, .. }) = registry.parse_child(&mut stream, "test")
        else {
            panic!("expected a structural error");
        };
        assert!(message.contains("nowhere"));
    }

    #[test]
    fn test_missing_initial_state() {
        let registry = Registry::standard();
        let tokens = node("StateMachine", vec![final_state("s1")]);
        let mut stream = TokenStream::from(tokens);
        assert!(matches!(
            registry.parse_child(&mut stream, "test"),
            Err(Error::Structural { .. })
        ));
    }
}
