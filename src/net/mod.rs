//! Open workflow net under construction.
//!
//! Places and transitions live in arenas addressed by [`PlaceId`] and
//! [`TransitionId`]. A place keeps every name it has ever carried, and the
//! net indexes all of them, so a name handed out before a merge still
//! resolves to the place that absorbed it.

use std::collections::HashMap;
use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::error::NetError;

pub mod owfn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(usize);

impl PlaceId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl TransitionId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a node interacts with the environment of the net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommunicationType {
    #[default]
    Internal,
    Input,
    Output,
    InOut,
}

impl CommunicationType {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            CommunicationType::Internal => "internal",
            CommunicationType::Input => "input",
            CommunicationType::Output => "output",
            CommunicationType::InOut => "input/output",
        }
    }

    fn is_interface(self) -> bool {
        self != CommunicationType::Internal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Place(PlaceId),
    Transition(TransitionId),
}

/// An edge of the flow relation. Weight is always one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arc {
    pub source: Node,
    pub target: Node,
}

#[derive(Debug, Clone)]
pub struct Place {
    history: IndexSet<String>,
    kind: CommunicationType,
    tokens: u32,
    is_final: bool,
    preset: IndexSet<TransitionId>,
    postset: IndexSet<TransitionId>,
}

impl Place {
    fn new(name: String, kind: CommunicationType) -> Self {
        Self {
            history: IndexSet::from([name]),
            kind,
            tokens: 0,
            is_final: false,
            preset: IndexSet::new(),
            postset: IndexSet::new(),
        }
    }

    /// The most recent name of the place.
    #[must_use]
    pub fn name(&self) -> &str {
        self.history.last().map_or("", String::as_str)
    }

    /// Every name the place has been known by, newest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().rev().map(String::as_str)
    }

    #[must_use]
    pub fn knows(&self, name: &str) -> bool {
        self.history.contains(name)
    }

    #[must_use]
    pub fn kind(&self) -> CommunicationType {
        self.kind
    }

    #[must_use]
    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    #[must_use]
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    #[must_use]
    pub fn preset(&self) -> &IndexSet<TransitionId> {
        &self.preset
    }

    #[must_use]
    pub fn postset(&self) -> &IndexSet<TransitionId> {
        &self.postset
    }
}

#[derive(Debug, Clone)]
pub struct Transition {
    name: String,
    kind: CommunicationType,
    preset: IndexSet<PlaceId>,
    postset: IndexSet<PlaceId>,
}

impl Transition {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> CommunicationType {
        self.kind
    }

    #[must_use]
    pub fn preset(&self) -> &IndexSet<PlaceId> {
        &self.preset
    }

    #[must_use]
    pub fn postset(&self) -> &IndexSet<PlaceId> {
        &self.postset
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Live(Place),
    Merged(PlaceId),
    Removed,
}

/// Addresses a place either by any name it has held or by a handle.
///
/// Handles of merged places are forwarded to the place that absorbed them.
#[derive(Debug, Clone, Copy)]
pub enum PlaceRef<'a> {
    Name(&'a str),
    Id(PlaceId),
}

impl<'a> From<&'a str> for PlaceRef<'a> {
    fn from(name: &'a str) -> Self {
        PlaceRef::Name(name)
    }
}

impl<'a> From<&'a String> for PlaceRef<'a> {
    fn from(name: &'a String) -> Self {
        PlaceRef::Name(name)
    }
}

impl From<PlaceId> for PlaceRef<'_> {
    fn from(id: PlaceId) -> Self {
        PlaceRef::Id(id)
    }
}

/// One end of an arc. Strings always name places.
#[derive(Debug, Clone, Copy)]
pub enum Endpoint<'a> {
    Place(PlaceRef<'a>),
    Transition(TransitionId),
}

impl<'a> From<&'a str> for Endpoint<'a> {
    fn from(name: &'a str) -> Self {
        Endpoint::Place(PlaceRef::Name(name))
    }
}

impl<'a> From<&'a String> for Endpoint<'a> {
    fn from(name: &'a String) -> Self {
        Endpoint::Place(PlaceRef::Name(name))
    }
}

impl From<PlaceId> for Endpoint<'_> {
    fn from(id: PlaceId) -> Self {
        Endpoint::Place(PlaceRef::Id(id))
    }
}

impl From<TransitionId> for Endpoint<'_> {
    fn from(id: TransitionId) -> Self {
        Endpoint::Transition(id)
    }
}

impl From<Node> for Endpoint<'_> {
    fn from(node: Node) -> Self {
        match node {
            Node::Place(id) => Endpoint::Place(PlaceRef::Id(id)),
            Node::Transition(id) => Endpoint::Transition(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetStatistics {
    pub places: usize,
    pub input_places: usize,
    pub output_places: usize,
    pub transitions: usize,
    pub arcs: usize,
}

impl fmt::Display for NetStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|P|= {}, |P_in|= {}, |P_out|= {}, |T|= {}, |F|= {}",
            self.places, self.input_places, self.output_places, self.transitions, self.arcs
        )
    }
}

#[derive(Debug, Default)]
pub struct PetriNet {
    places: Vec<Slot>,
    names: HashMap<String, PlaceId>,
    internal: IndexSet<PlaceId>,
    input: IndexSet<PlaceId>,
    output: IndexSet<PlaceId>,
    transitions: Vec<Transition>,
    transition_names: HashMap<String, TransitionId>,
    arcs: IndexSet<Arc>,
    final_sets: Vec<IndexSet<PlaceId>>,
    ports: IndexMap<String, IndexSet<String>>,
    activity_count: usize,
}

impl PetriNet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The scope id of the fragment currently being compiled.
    #[must_use]
    pub fn activity_count(&self) -> usize {
        self.activity_count
    }

    /// Allocates the scope id for the next nested fragment.
    pub fn next_scope(&mut self) -> usize {
        self.activity_count += 1;
        self.activity_count
    }

    pub fn new_place(
        &mut self,
        name: impl Into<String>,
        kind: CommunicationType,
    ) -> Result<PlaceId, NetError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NetError::EmptyName);
        }
        if self.names.contains_key(&name) {
            return Err(NetError::DuplicatePlace(name));
        }

        let id = PlaceId(self.places.len());
        self.places.push(Slot::Live(Place::new(name.clone(), kind)));
        self.names.insert(name, id);
        self.partition_mut(kind).insert(id);
        Ok(id)
    }

    pub fn internal_place(&mut self, name: impl Into<String>) -> Result<PlaceId, NetError> {
        self.new_place(name, CommunicationType::Internal)
    }

    pub fn new_transition(&mut self, name: impl Into<String>) -> Result<TransitionId, NetError> {
        self.new_transition_of(name, CommunicationType::Internal)
    }

    /// Creates a transition, or hands back the existing one of the same name.
    ///
    /// Unlike places, transition names are not checked for uniqueness: a
    /// second request for a known name is answered with the first handle.
    pub fn new_transition_of(
        &mut self,
        name: impl Into<String>,
        kind: CommunicationType,
    ) -> Result<TransitionId, NetError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NetError::EmptyName);
        }
        if let Some(&id) = self.transition_names.get(&name) {
            log::debug!("transition '{name}' already exists, reusing it");
            return Ok(id);
        }

        let id = TransitionId(self.transitions.len());
        self.transitions.push(Transition {
            name: name.clone(),
            kind,
            preset: IndexSet::new(),
            postset: IndexSet::new(),
        });
        self.transition_names.insert(name, id);
        Ok(id)
    }

    pub fn new_arc<'a>(
        &mut self,
        source: impl Into<Endpoint<'a>>,
        target: impl Into<Endpoint<'a>>,
    ) -> Result<(), NetError> {
        let source = self.locate(source.into())?;
        let target = self.locate(target.into())?;

        match (source, target) {
            (Node::Place(a), Node::Place(b)) => Err(NetError::PlaceToPlace(
                self.node_label(Node::Place(a)),
                self.node_label(Node::Place(b)),
            )),
            (Node::Transition(a), Node::Transition(b)) => Err(NetError::TransitionToTransition(
                self.node_label(Node::Transition(a)),
                self.node_label(Node::Transition(b)),
            )),
            _ => {
                self.connect(Arc { source, target });
                Ok(())
            }
        }
    }

    /// Looks a place up by any name it has ever held.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<PlaceId> {
        self.names.get(name).copied()
    }

    /// Follows a handle through merges to the live place it ended up in.
    #[must_use]
    pub fn current(&self, id: PlaceId) -> Option<PlaceId> {
        self.resolve(PlaceRef::Id(id))
    }

    /// Unifies two places into a fresh one that answers to every name
    /// either of them ever had.
    ///
    /// The merged place takes the newest name of `p1`, the larger marking
    /// and the union of both neighbourhoods. Both ancestors leave the net.
    pub fn merge<'a>(
        &mut self,
        p1: impl Into<PlaceRef<'a>>,
        p2: impl Into<PlaceRef<'a>>,
    ) -> Result<PlaceId, NetError> {
        let (p1, p2) = (p1.into(), p2.into());
        let a = self
            .resolve(p1)
            .ok_or_else(|| NetError::MissingPlace(self.describe(p1)))?;
        let b = self
            .resolve(p2)
            .ok_or_else(|| NetError::MissingPlace(self.describe(p2)))?;
        if a == b {
            return Ok(a);
        }

        let kind = self.merged_kind(a, b)?;
        let merged = PlaceId(self.places.len());

        for set in &mut self.final_sets {
            if set.contains(&a) || set.contains(&b) {
                *set = set
                    .iter()
                    .map(|&p| if p == a || p == b { merged } else { p })
                    .collect();
            }
        }

        let (Some(first), Some(second)) = (
            self.detach(a, Slot::Merged(merged)),
            self.detach(b, Slot::Merged(merged)),
        ) else {
            return Err(NetError::MissingPlace(self.describe(p1)));
        };

        let name = first.name().to_string();
        let mut history = second.history;
        history.extend(first.history);
        history.shift_remove(&name);
        history.insert(name);

        for known in &history {
            self.names.insert(known.clone(), merged);
        }

        let preset: Vec<_> = first.preset.union(&second.preset).copied().collect();
        let postset: Vec<_> = first.postset.union(&second.postset).copied().collect();

        self.places.push(Slot::Live(Place {
            history,
            kind,
            tokens: first.tokens.max(second.tokens),
            is_final: first.is_final || second.is_final,
            preset: IndexSet::new(),
            postset: IndexSet::new(),
        }));
        self.partition_mut(kind).insert(merged);

        for t in preset {
            self.connect(Arc {
                source: Node::Transition(t),
                target: Node::Place(merged),
            });
        }
        for t in postset {
            self.connect(Arc {
                source: Node::Place(merged),
                target: Node::Transition(t),
            });
        }

        Ok(merged)
    }

    /// Drops a place and every arc touching it. Unknown places are ignored.
    pub fn remove<'a>(&mut self, place: impl Into<PlaceRef<'a>>) {
        let Some(id) = self.resolve(place.into()) else {
            return;
        };
        if self.detach(id, Slot::Removed).is_some() {
            for set in &mut self.final_sets {
                set.shift_remove(&id);
            }
        }
    }

    /// Appends one disjunct to the final condition.
    pub fn add_final_set<'a, I, P>(&mut self, places: I) -> Result<(), NetError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PlaceRef<'a>>,
    {
        let mut set = IndexSet::new();
        for place in places {
            let place = place.into();
            let id = self
                .resolve(place)
                .ok_or_else(|| NetError::MissingPlace(self.describe(place)))?;
            set.insert(id);
        }
        if set.is_empty() {
            return Err(NetError::EmptyFinalSet);
        }

        for id in &set {
            if let Some(place) = self.place_mut(*id) {
                place.is_final = true;
            }
        }
        self.final_sets.push(set);
        Ok(())
    }

    pub fn set_tokens<'a>(
        &mut self,
        place: impl Into<PlaceRef<'a>>,
        tokens: u32,
    ) -> Result<(), NetError> {
        let place = place.into();
        let id = self
            .resolve(place)
            .ok_or_else(|| NetError::MissingPlace(self.describe(place)))?;
        if let Some(place) = self.place_mut(id) {
            place.tokens = tokens;
        }
        Ok(())
    }

    /// Records `place` as part of the interface port `port`.
    ///
    /// Ports keep names, so they follow the place through later merges.
    pub fn add_port(&mut self, port: impl Into<String>, place: impl Into<String>) {
        self.ports
            .entry(port.into())
            .or_default()
            .insert(place.into());
    }

    /// Ports with their member places resolved to live handles.
    pub fn ports(&self) -> impl Iterator<Item = (&str, IndexSet<PlaceId>)> {
        self.ports.iter().map(move |(port, names)| {
            let places = names.iter().filter_map(|name| self.find(name)).collect();
            (port.as_str(), places)
        })
    }

    #[must_use]
    pub fn place(&self, id: PlaceId) -> Option<&Place> {
        match self.places.get(id.0)? {
            Slot::Live(place) => Some(place),
            Slot::Merged(_) | Slot::Removed => None,
        }
    }

    #[must_use]
    pub fn place_by_name(&self, name: &str) -> Option<&Place> {
        self.find(name).and_then(|id| self.place(id))
    }

    #[must_use]
    pub fn place_name(&self, id: PlaceId) -> Option<&str> {
        self.place(id).map(Place::name)
    }

    #[must_use]
    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(id.0)
    }

    #[must_use]
    pub fn find_transition(&self, name: &str) -> Option<TransitionId> {
        self.transition_names.get(name).copied()
    }

    pub fn internal_places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.partition(&self.internal)
    }

    pub fn input_places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.partition(&self.input)
    }

    pub fn output_places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.partition(&self.output)
    }

    /// All live places: internal, then input, then output.
    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.internal_places()
            .chain(self.input_places())
            .chain(self.output_places())
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions
            .iter()
            .enumerate()
            .map(|(i, t)| (TransitionId(i), t))
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.arcs.iter()
    }

    #[must_use]
    pub fn final_sets(&self) -> &[IndexSet<PlaceId>] {
        &self.final_sets
    }

    /// Places holding tokens in the initial marking.
    pub fn initial_marking(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places().filter(|(_, place)| place.tokens > 0)
    }

    /// Every name index entry, for consistency checks.
    pub(crate) fn name_index(&self) -> impl Iterator<Item = (&str, PlaceId)> {
        self.names.iter().map(|(name, id)| (name.as_str(), *id))
    }

    #[must_use]
    pub fn node_name(&self, node: Node) -> Option<&str> {
        match node {
            Node::Place(id) => self.place_name(id),
            Node::Transition(id) => self.transition(id).map(Transition::name),
        }
    }

    #[must_use]
    pub fn statistics(&self) -> NetStatistics {
        NetStatistics {
            places: self.internal.len() + self.input.len() + self.output.len(),
            input_places: self.input.len(),
            output_places: self.output.len(),
            transitions: self.transitions.len(),
            arcs: self.arcs.len(),
        }
    }

    fn partition(&self, ids: &IndexSet<PlaceId>) -> impl Iterator<Item = (PlaceId, &Place)> {
        ids.iter()
            .filter_map(move |&id| self.place(id).map(|place| (id, place)))
    }

    fn partition_mut(&mut self, kind: CommunicationType) -> &mut IndexSet<PlaceId> {
        match kind {
            CommunicationType::Internal | CommunicationType::InOut => &mut self.internal,
            CommunicationType::Input => &mut self.input,
            CommunicationType::Output => &mut self.output,
        }
    }

    fn place_mut(&mut self, id: PlaceId) -> Option<&mut Place> {
        match self.places.get_mut(id.0)? {
            Slot::Live(place) => Some(place),
            Slot::Merged(_) | Slot::Removed => None,
        }
    }

    fn resolve(&self, place: PlaceRef<'_>) -> Option<PlaceId> {
        match place {
            PlaceRef::Name(name) => self.find(name),
            PlaceRef::Id(mut id) => loop {
                match self.places.get(id.0)? {
                    Slot::Live(_) => return Some(id),
                    Slot::Merged(next) => id = *next,
                    Slot::Removed => return None,
                }
            },
        }
    }

    fn locate(&self, endpoint: Endpoint<'_>) -> Result<Node, NetError> {
        match endpoint {
            Endpoint::Place(place) => self
                .resolve(place)
                .map(Node::Place)
                .ok_or_else(|| NetError::MissingPlace(self.describe(place))),
            Endpoint::Transition(id) if id.0 < self.transitions.len() => {
                Ok(Node::Transition(id))
            }
            Endpoint::Transition(id) => Err(NetError::MissingTransition(id.0)),
        }
    }

    fn describe(&self, place: PlaceRef<'_>) -> String {
        match place {
            PlaceRef::Name(name) => name.to_string(),
            PlaceRef::Id(id) => format!("#{}", id.0),
        }
    }

    fn node_label(&self, node: Node) -> String {
        self.node_name(node).unwrap_or_default().to_string()
    }

    fn merged_kind(&self, a: PlaceId, b: PlaceId) -> Result<CommunicationType, NetError> {
        let (Some(first), Some(second)) = (self.place(a), self.place(b)) else {
            return Err(NetError::MissingPlace(format!("#{}", a.0)));
        };
        match (first.kind, second.kind) {
            (x, y) if x == y => Ok(x),
            (CommunicationType::Internal, other) | (other, CommunicationType::Internal) => {
                Ok(other)
            }
            (CommunicationType::InOut, other) | (other, CommunicationType::InOut)
                if other.is_interface() =>
            {
                Ok(CommunicationType::InOut)
            }
            (x, y) => Err(NetError::IncompatibleMerge {
                a: first.name().to_string(),
                kind_a: x.label(),
                b: second.name().to_string(),
                kind_b: y.label(),
            }),
        }
    }

    fn connect(&mut self, arc: Arc) {
        match (arc.source, arc.target) {
            (Node::Place(p), Node::Transition(t)) => {
                if let Some(place) = self.place_mut(p) {
                    place.postset.insert(t);
                }
                if let Some(transition) = self.transitions.get_mut(t.0) {
                    transition.preset.insert(p);
                }
            }
            (Node::Transition(t), Node::Place(p)) => {
                if let Some(place) = self.place_mut(p) {
                    place.preset.insert(t);
                }
                if let Some(transition) = self.transitions.get_mut(t.0) {
                    transition.postset.insert(p);
                }
            }
            _ => return,
        }
        self.arcs.insert(arc);
    }

    /// Takes a live place out of the net, leaving `tombstone` in its slot.
    fn detach(&mut self, id: PlaceId, tombstone: Slot) -> Option<Place> {
        let slot = self.places.get_mut(id.0)?;
        if !matches!(slot, Slot::Live(_)) {
            return None;
        }
        let Slot::Live(place) = std::mem::replace(slot, tombstone) else {
            return None;
        };

        for &t in &place.preset {
            if let Some(transition) = self.transitions.get_mut(t.0) {
                transition.postset.shift_remove(&id);
            }
            self.arcs.shift_remove(&Arc {
                source: Node::Transition(t),
                target: Node::Place(id),
            });
        }
        for &t in &place.postset {
            if let Some(transition) = self.transitions.get_mut(t.0) {
                transition.preset.shift_remove(&id);
            }
            self.arcs.shift_remove(&Arc {
                source: Node::Place(id),
                target: Node::Transition(t),
            });
        }

        self.partition_mut(place.kind).shift_remove(&id);
        for known in &place.history {
            if self.names.get(known) == Some(&id) {
                self.names.remove(known);
            }
        }
        Some(place)
    }
}
