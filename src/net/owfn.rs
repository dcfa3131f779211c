//! The oWFN text format: writer and reader.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::error::Error;
use crate::net::{CommunicationType, NetStatistics, Place, PlaceId, PetriNet};

/// Name under which the root boundary place is recognised in the marking.
const INITIAL_PLACE: &str = "0.internal.initialized";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwfnOptions {
    /// Write the `PORTS` section.
    pub ports: bool,
}

/// Displays a net in oWFN syntax.
pub struct Owfn<'a> {
    net: &'a PetriNet,
    options: OwfnOptions,
}

impl<'a> Owfn<'a> {
    #[must_use]
    pub fn new(net: &'a PetriNet, options: OwfnOptions) -> Self {
        Self { net, options }
    }
}

fn write_places<'a>(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    separator: &str,
    places: impl Iterator<Item = (PlaceId, &'a Place)>,
) -> fmt::Result {
    let names: Vec<&str> = places.map(|(_, place)| place.name()).collect();
    writeln!(f, "  {title}")?;
    writeln!(f, "    {};", names.join(separator))?;
    writeln!(f)
}

impl Owfn<'_> {
    fn write_ports(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ports: Vec<_> = self.net.ports().collect();
        if ports.is_empty() {
            return Ok(());
        }

        writeln!(f, "PORTS")?;
        for (port, places) in ports {
            let names: Vec<&str> = places
                .iter()
                .filter_map(|id| self.net.place_name(*id))
                .collect();
            writeln!(f, "  {port}:")?;
            writeln!(f, "    {};", names.join(",\n    "))?;
        }
        writeln!(f)
    }

    fn write_marking(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .net
            .initial_marking()
            .map(|(_, place)| {
                let note = if place.knows(INITIAL_PLACE) {
                    " {initial place}"
                } else {
                    ""
                };
                format!("  {}:\t{}{note}", place.name(), place.tokens())
            })
            .collect();

        writeln!(f, "INITIALMARKING")?;
        if entries.is_empty() {
            writeln!(f, "  ;")?;
        } else {
            writeln!(f, "{};", entries.join(",\n"))?;
        }
        writeln!(f)
    }

    fn write_final_condition(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |id: &PlaceId| self.net.place_name(*id).unwrap_or_default();
        let disjuncts: Vec<String> = self
            .net
            .final_sets()
            .iter()
            .map(|set| match set.len() {
                1 => format!("{}=1", set.iter().map(name).collect::<String>()),
                _ => {
                    let atoms: Vec<String> =
                        set.iter().map(|id| format!("({}=1)", name(id))).collect();
                    format!("( {})", atoms.join(" AND "))
                }
            })
            .collect();

        writeln!(f, "FINALCONDITION")?;
        writeln!(f, "  ({});", disjuncts.join(" OR "))?;
        writeln!(f)
    }

    fn write_transitions(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |ids: &mut dyn Iterator<Item = &PlaceId>| {
            ids.filter_map(|id| self.net.place_name(*id))
                .collect::<Vec<_>>()
                .join(", ")
        };

        for (_, transition) in self.net.transitions() {
            match transition.kind() {
                CommunicationType::Internal => writeln!(f, "TRANSITION {}", transition.name())?,
                kind => writeln!(f, "TRANSITION {} {{ {} }}", transition.name(), kind.label())?,
            }
            writeln!(f, "  CONSUME {};", names(&mut transition.preset().iter()))?;
            writeln!(f, "  PRODUCE {};", names(&mut transition.postset().iter()))?;
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Owfn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let net = self.net;

        writeln!(f, "{{")?;
        writeln!(f, "  generated by: wfnet {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(f, "  net size:     {}", net.statistics())?;
        writeln!(f, "}}")?;
        writeln!(f)?;

        writeln!(f, "PLACE")?;
        write_places(f, "INTERNAL", ", ", net.internal_places())?;
        write_places(f, "INPUT", ",\n    ", net.input_places())?;
        write_places(f, "OUTPUT", ",\n    ", net.output_places())?;

        if self.options.ports {
            self.write_ports(f)?;
        }
        self.write_marking(f)?;
        self.write_final_condition(f)?;
        self.write_transitions(f)?;

        write!(f, "{{ END OF FILE }}")
    }
}

#[derive(Parser)]
#[grammar = "../grammar/owfn.pest"]
struct OwfnParser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwfnTransition {
    pub name: String,
    pub kind: CommunicationType,
    pub consume: Vec<String>,
    pub produce: Vec<String>,
}

/// A parsed oWFN file. Names are kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwfnDocument {
    pub internal: Vec<String>,
    pub input: Vec<String>,
    pub output: Vec<String>,
    pub ports: IndexMap<String, Vec<String>>,
    pub marking: IndexMap<String, u32>,
    /// Disjunction of conjunctions of places carrying one token.
    pub final_condition: Vec<Vec<String>>,
    pub transitions: Vec<OwfnTransition>,
}

impl OwfnDocument {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let document = OwfnParser::parse(Rule::Document, input)
            .map_err(|e| Error::OwfnSyntax(e.to_string()))?
            .next()
            .ok_or_else(|| Error::OwfnSyntax("empty document".to_string()))?;

        let mut parsed = Self::default();
        for pair in document.into_inner() {
            match pair.as_rule() {
                Rule::Places => {
                    for section in pair.into_inner() {
                        let rule = section.as_rule();
                        let names = names(section.into_inner().next());
                        match rule {
                            Rule::Internal => parsed.internal = names,
                            Rule::Input => parsed.input = names,
                            Rule::Output => parsed.output = names,
                            _ => {}
                        }
                    }
                }
                Rule::Ports => {
                    for port in pair.into_inner() {
                        let mut inner = port.into_inner();
                        let name = text(inner.next());
                        parsed.ports.insert(name, names(inner.next()));
                    }
                }
                Rule::Marking => {
                    for marked in pair.into_inner() {
                        let mut inner = marked.into_inner();
                        let name = text(inner.next());
                        parsed.marking.insert(name, count(inner.next())?);
                    }
                }
                Rule::FinalCondition => {
                    for disjunct in pair.into_inner() {
                        let set = disjunct
                            .into_inner()
                            .map(|atom| text(atom.into_inner().next()))
                            .collect();
                        parsed.final_condition.push(set);
                    }
                }
                Rule::Transition => parsed.transitions.push(transition(pair)),
                _ => {}
            }
        }

        log::debug!("read oWFN document: {}", parsed.statistics());
        Ok(parsed)
    }

    /// Counts as reported by [`PetriNet::statistics`] for the written net.
    #[must_use]
    pub fn statistics(&self) -> NetStatistics {
        NetStatistics {
            places: self.internal.len() + self.input.len() + self.output.len(),
            input_places: self.input.len(),
            output_places: self.output.len(),
            transitions: self.transitions.len(),
            arcs: self
                .transitions
                .iter()
                .map(|t| t.consume.len() + t.produce.len())
                .sum(),
        }
    }
}

impl FromStr for OwfnDocument {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn text(pair: Option<Pair<'_, Rule>>) -> String {
    pair.map(|p| p.as_str().to_string()).unwrap_or_default()
}

fn names(pair: Option<Pair<'_, Rule>>) -> Vec<String> {
    pair.map(|p| p.into_inner().map(|name| name.as_str().to_string()).collect())
        .unwrap_or_default()
}

fn count(pair: Option<Pair<'_, Rule>>) -> Result<u32, Error> {
    let digits = text(pair);
    digits
        .parse()
        .map_err(|_| Error::OwfnSyntax(format!("invalid token count '{digits}'")))
}

fn transition(pair: Pair<'_, Rule>) -> OwfnTransition {
    let mut transition = OwfnTransition {
        name: String::new(),
        kind: CommunicationType::Internal,
        consume: vec![],
        produce: vec![],
    };

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::Name => transition.name = part.as_str().to_string(),
            Rule::Kind => {
                transition.kind = match part.into_inner().next().map(|k| k.as_str()) {
                    Some("input") => CommunicationType::Input,
                    Some("output") => CommunicationType::Output,
                    _ => CommunicationType::InOut,
                }
            }
            Rule::Consume => transition.consume = names(part.into_inner().next()),
            Rule::Produce => transition.produce = names(part.into_inner().next()),
            _ => {}
        }
    }
    transition
}
