use std::collections::HashSet;

use indexmap::IndexSet;

use crate::error::{ValidationError, ValidationErrorKind};
use crate::net::{Arc, Node, PetriNet, PlaceId};

pub type ValidationResult<T = ()> = Result<T, Vec<ValidationError>>;

impl PetriNet {
    /// Checks the structural invariants every compiled net must satisfy.
    pub fn validate(&self) -> ValidationResult {
        let mut errors = vec![];

        if let Err(arcs) = check_arcs(self, self.arcs()) {
            errors.extend(arcs);
        }

        if let Err(flow) = check_flow(self) {
            errors.extend(flow);
        }

        if let Err(finals) = check_final_places(self, self.final_sets()) {
            errors.extend(finals);
        }

        if let Err(names) = check_names(self, self.name_index()) {
            errors.extend(names);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn collect(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_live(net: &PetriNet, node: Node) -> bool {
    match node {
        Node::Place(id) => net.place(id).is_some(),
        Node::Transition(id) => net.transition(id).is_some(),
    }
}

fn check_arcs<'a>(net: &PetriNet, arcs: impl IntoIterator<Item = &'a Arc>) -> ValidationResult {
    let mut errors = vec![];

    for arc in arcs {
        match (arc.source, arc.target) {
            (Node::Place(_), Node::Transition(_)) | (Node::Transition(_), Node::Place(_)) => {}
            _ => {
                errors.push(ValidationError::new(
                    ValidationErrorKind::IllegalArc,
                    format!("Arc {arc:?} does not connect a place with a transition"),
                ));
                continue;
            }
        }

        for node in [arc.source, arc.target] {
            if !is_live(net, node) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::DanglingArc,
                    format!("Arc {arc:?} touches {node:?}, which is not in the net"),
                ));
            }
        }
    }

    collect(errors)
}

fn arc(source: Node, target: Node) -> Arc {
    Arc { source, target }
}

/// Pre- and post-sets must mirror the flow relation in both directions.
fn check_flow(net: &PetriNet) -> ValidationResult {
    let mut errors = vec![];
    let arcs: HashSet<&Arc> = net.arcs().collect();
    let mut expected = 0;

    let mut require = |arc: Arc, owner: &str| {
        if !arcs.contains(&arc) {
            errors.push(ValidationError::new(
                ValidationErrorKind::InconsistentFlow,
                format!(
                    "Neighbourhood of '{owner}' lists {arc:?}, which is not in the flow relation"
                ),
            ));
        }
    };

    for (id, place) in net.places() {
        for &t in place.preset() {
            require(arc(Node::Transition(t), Node::Place(id)), place.name());
        }
        for &t in place.postset() {
            require(arc(Node::Place(id), Node::Transition(t)), place.name());
        }
        expected += place.preset().len() + place.postset().len();
    }
    for (id, transition) in net.transitions() {
        for &p in transition.preset() {
            require(arc(Node::Place(p), Node::Transition(id)), transition.name());
        }
        for &p in transition.postset() {
            require(arc(Node::Transition(id), Node::Place(p)), transition.name());
        }
    }

    if expected != arcs.len() {
        errors.push(ValidationError::new(
            ValidationErrorKind::InconsistentFlow,
            format!(
                "Places account for {expected} arcs but the flow relation holds {}",
                arcs.len()
            ),
        ));
    }

    collect(errors)
}

fn check_final_places(net: &PetriNet, sets: &[IndexSet<PlaceId>]) -> ValidationResult {
    let mut errors = vec![];

    for (i, set) in sets.iter().enumerate() {
        for &id in set {
            if net.place(id).is_none() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::StaleFinalPlace,
                    format!("Final set {i} refers to {id:?}, which is no longer a place"),
                ));
            }
        }
    }

    collect(errors)
}

fn check_names<'a>(
    net: &PetriNet,
    names: impl IntoIterator<Item = (&'a str, PlaceId)>,
) -> ValidationResult {
    let mut errors = vec![];

    for (name, id) in names {
        let known = net.place(id).is_some_and(|place| place.knows(name));
        if !known {
            errors.push(ValidationError::new(
                ValidationErrorKind::StaleName,
                format!("Name '{name}' points at {id:?}, which does not carry it"),
            ));
        }
    }

    collect(errors)
}
