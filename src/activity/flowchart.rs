use std::collections::HashSet;

use crate::activity::{
    Activity, ActivityKind, Empty, Registry, Scope, or_empty, parse_reference, reference_id, splice,
    unexpected, x_name,
};
use crate::error::{Error, NetError};
use crate::net::PetriNet;
use crate::parser::{ACTIVITIES_NS, TokenStream, qualify};

const NAME: &str = "Flowchart";

#[derive(Debug)]
enum FlowNode {
    Step {
        id: String,
        action: Option<Box<dyn Activity>>,
        next: Option<String>,
    },
    Decision {
        id: String,
        on_true: Option<String>,
        on_false: Option<String>,
    },
    Switch {
        id: String,
        default: Option<String>,
        cases: Vec<Option<String>>,
    },
}

impl FlowNode {
    fn id(&self) -> &str {
        match self {
            FlowNode::Step { id, .. }
            | FlowNode::Decision { id, .. }
            | FlowNode::Switch { id, .. } => id,
        }
    }

    fn targets(&self) -> Vec<&str> {
        match self {
            FlowNode::Step { next, .. } => next.iter().map(String::as_str).collect(),
            FlowNode::Decision {
                on_true, on_false, ..
            } => on_true.iter().chain(on_false).map(String::as_str).collect(),
            FlowNode::Switch { default, cases, .. } => {
                default.iter().chain(cases.iter().flatten()).map(String::as_str).collect()
            }
        }
    }
}

/// Unstructured flow graph of steps, decisions and switches.
///
/// Nodes are identified by `x:Name` and linked by reference. Compilation
/// first lays out each node's places, then merges every outgoing edge
/// with the `start` place of its target. Edges without a target end the
/// flowchart.
#[derive(Debug, Default)]
pub struct Flowchart {
    start: Option<String>,
    nodes: Vec<FlowNode>,
    generated: usize,
}

impl Flowchart {
    fn qname(local: &str) -> String {
        qualify(ACTIVITIES_NS, local)
    }

    fn node_id(&mut self, name: Option<&str>) -> String {
        match name {
            Some(name) => name.to_string(),
            None => {
                self.generated += 1;
                format!("__node{}", self.generated)
            }
        }
    }

    /// Parses one node (or a reference to one) and returns its id.
    fn parse_node(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
    ) -> Result<Option<String>, Error> {
        let front = tokens.peek_start(NAME)?.qname().to_string();

        if front == Self::qname("FlowStep") {
            self.parse_step(tokens, registry).map(Some)
        } else if front == Self::qname("FlowDecision") {
            self.parse_decision(tokens, registry).map(Some)
        } else if front == Self::qname("FlowSwitch") {
            self.parse_switch(tokens, registry).map(Some)
        } else if front == x_name("Reference") {
            parse_reference(tokens, NAME).map(Some)
        } else if front == x_name("Null") {
            tokens.skip_element(NAME)?;
            Ok(None)
        } else {
            Err(unexpected(tokens, NAME))
        }
    }

    /// Parses a property element holding at most one node.
    fn parse_target(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
        wrapper: &str,
    ) -> Result<Option<String>, Error> {
        tokens.expect_start(wrapper, NAME)?;
        let target = if tokens.at_end_of(wrapper) {
            None
        } else {
            self.parse_node(tokens, registry)?
        };
        tokens.expect_end(wrapper, NAME)?;
        Ok(target)
    }

    fn parse_step(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
    ) -> Result<String, Error> {
        let qname = Self::qname("FlowStep");
        let next_tag = Self::qname("FlowStep.Next");
        let start = tokens.expect_start(&qname, NAME)?;
        let id = self.node_id(start.attribute("x:Name"));

        let mut action = None;
        let mut next = None;
        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&x_name("Key")) {
                tokens.skip_element(NAME)?;
            } else if tokens.at_start_of(&next_tag) {
                next = self.parse_target(tokens, registry, &next_tag)?;
            } else if action.is_none() {
                action = Some(registry.parse_child(tokens, NAME)?);
            } else {
                return Err(unexpected(tokens, NAME));
            }
        }
        tokens.expect_end(&qname, NAME)?;

        self.nodes.push(FlowNode::Step {
            id: id.clone(),
            action,
            next,
        });
        Ok(id)
    }

    fn parse_decision(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
    ) -> Result<String, Error> {
        let qname = Self::qname("FlowDecision");
        let true_tag = Self::qname("FlowDecision.True");
        let false_tag = Self::qname("FlowDecision.False");
        let condition = Self::qname("FlowDecision.Condition");

        let start = tokens.expect_start(&qname, NAME)?;
        let id = self.node_id(start.attribute("x:Name"));
        let mut on_true = start.attribute("True").map(|r| reference_id(r).to_string());
        let mut on_false = start.attribute("False").map(|r| reference_id(r).to_string());

        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&true_tag) {
                on_true = self.parse_target(tokens, registry, &true_tag)?;
            } else if tokens.at_start_of(&false_tag) {
                on_false = self.parse_target(tokens, registry, &false_tag)?;
            } else if tokens.at_start_of(&condition) || tokens.at_start_of(&x_name("Key")) {
                tokens.skip_element(NAME)?;
            } else {
                return Err(unexpected(tokens, NAME));
            }
        }
        tokens.expect_end(&qname, NAME)?;

        self.nodes.push(FlowNode::Decision {
            id: id.clone(),
            on_true,
            on_false,
        });
        Ok(id)
    }

    fn parse_switch(
        &mut self,
        tokens: &mut TokenStream,
        registry: &Registry,
    ) -> Result<String, Error> {
        let qname = Self::qname("FlowSwitch");
        let default_tag = Self::qname("FlowSwitch.Default");
        let expression = Self::qname("FlowSwitch.Expression");

        let start = tokens.expect_start(&qname, NAME)?;
        let id = self.node_id(start.attribute("x:Name"));
        let mut default = start.attribute("Default").map(|r| reference_id(r).to_string());
        let mut cases = vec![];

        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&default_tag) {
                default = self.parse_target(tokens, registry, &default_tag)?;
            } else if tokens.at_start_of(&expression) || tokens.at_start_of(&x_name("Key")) {
                tokens.skip_element(NAME)?;
            } else {
                cases.push(self.parse_node(tokens, registry)?);
            }
        }
        tokens.expect_end(&qname, NAME)?;

        self.nodes.push(FlowNode::Switch {
            id: id.clone(),
            default,
            cases,
        });
        Ok(id)
    }

    fn check_references(&self, tokens: &TokenStream) -> Result<(), Error> {
        let mut known = HashSet::new();
        for node in &self.nodes {
            if !known.insert(node.id()) {
                return Err(tokens.structural(format!("duplicate flow node '{}'", node.id()), NAME));
            }
        }

        let referenced = self
            .nodes
            .iter()
            .flat_map(FlowNode::targets)
            .chain(self.start.as_deref());
        for target in referenced {
            if !known.contains(target) {
                return Err(tokens.structural(format!("unknown flow node '{target}'"), NAME));
            }
        }
        Ok(())
    }

    fn compile_node(
        &self,
        net: &mut PetriNet,
        scope: Scope,
        node: &FlowNode,
    ) -> Result<(), NetError> {
        let place = |id: &str, suffix: &str| scope.name(&format!("{id}.{suffix}"));

        match node {
            FlowNode::Step { id, action, .. } => {
                let (start, next) = (place(id, "start"), place(id, "next"));
                net.internal_place(start.clone())?;
                net.internal_place(next.clone())?;
                splice(net, or_empty(action.as_deref()), &start, &next)?;
            }
            FlowNode::Decision { id, .. } => {
                let start = place(id, "start");
                let condition = place(id, "condition");
                let (on_true, on_false) = (place(id, "true"), place(id, "false"));
                for name in [&start, &condition, &on_true, &on_false] {
                    net.internal_place(name.clone())?;
                }

                let eval = net.new_transition(place(id, "evalcondition"))?;
                let start_true = net.new_transition(place(id, "starttrue"))?;
                let start_false = net.new_transition(place(id, "startfalse"))?;
                net.new_arc(&start, eval)?;
                net.new_arc(eval, &condition)?;
                net.new_arc(&condition, start_true)?;
                net.new_arc(&condition, start_false)?;
                net.new_arc(start_true, &on_true)?;
                net.new_arc(start_false, &on_false)?;
            }
            FlowNode::Switch { id, cases, .. } => {
                let start = place(id, "start");
                let default = place(id, "default");
                net.internal_place(start.clone())?;
                net.internal_place(default.clone())?;

                let mut last = start;
                for i in 1..=cases.len() {
                    let condition = place(id, &format!("condition{i}"));
                    let case = place(id, &format!("case{i}"));
                    net.internal_place(condition.clone())?;
                    net.internal_place(case.clone())?;

                    let eval = net.new_transition(place(id, &format!("evalcase{i}")))?;
                    let init = net.new_transition(place(id, &format!("initcase{i}")))?;
                    net.new_arc(&last, eval)?;
                    net.new_arc(eval, &condition)?;
                    net.new_arc(&condition, init)?;
                    net.new_arc(init, &case)?;
                    last = condition;
                }

                let init_default = net.new_transition(place(id, "initdefault"))?;
                net.new_arc(&last, init_default)?;
                net.new_arc(init_default, &default)?;
            }
        }
        Ok(())
    }

    fn link_node(&self, net: &mut PetriNet, scope: Scope, node: &FlowNode) -> Result<(), NetError> {
        let place = |id: &str, suffix: &str| scope.name(&format!("{id}.{suffix}"));
        let closed = scope.closed();
        let link = |net: &mut PetriNet, from: String, to: Option<&String>| match to {
            Some(target) => net.merge(&from, &place(target, "start")).map(|_| ()),
            None => net.merge(&closed, &from).map(|_| ()),
        };

        match node {
            FlowNode::Step { id, next, .. } => link(net, place(id, "next"), next.as_ref()),
            FlowNode::Decision {
                id,
                on_true,
                on_false,
            } => {
                link(net, place(id, "true"), on_true.as_ref())?;
                link(net, place(id, "false"), on_false.as_ref())
            }
            FlowNode::Switch { id, default, cases } => {
                link(net, place(id, "default"), default.as_ref())?;
                for (i, case) in cases.iter().enumerate() {
                    link(net, place(id, &format!("case{}", i + 1)), case.as_ref())?;
                }
                Ok(())
            }
        }
    }
}

impl Activity for Flowchart {
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
        let start_tag = Self::qname("Flowchart.StartNode");

        let root = tokens.expect_start(&qname, NAME)?;
        self.start = root
            .attribute("StartNode")
            .map(|r| reference_id(r).to_string());

        while !tokens.at_end_of(&qname) {
            if tokens.at_start_of(&start_tag) {
                tokens.next_token(NAME)?;
                while !tokens.at_end_of(&start_tag) {
                    let id = self.parse_node(tokens, registry)?;
                    if self.start.is_none() {
                        self.start = id;
                    }
                }
                tokens.expect_end(&start_tag, NAME)?;
            } else {
                self.parse_node(tokens, registry)?;
            }
        }

        self.check_references(tokens)?;
        tokens.expect_end(&qname, NAME)?;
        Ok(())
    }

    fn compile(&self, net: &mut PetriNet) -> Result<(), NetError> {
        let scope = Scope::open(net)?;
        let Some(start) = &self.start else {
            splice(net, &Empty, &scope.initialized(), &scope.closed())?;
            return Ok(());
        };

        for node in &self.nodes {
            self.compile_node(net, scope, node)?;
        }
        net.merge(&scope.initialized(), &scope.name(&format!("{start}.start")))?;
        for node in &self.nodes {
            self.link_node(net, scope, node)?;
        }
        Ok(())
    }
}
