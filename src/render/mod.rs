use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use layout::backends::svg::SVGWriter;
use layout::gv::{DotParser, GraphBuilder};
use layout::topo::layout::VisualGraph;
use petgraph::Directed;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{Graph as PetGraph, NodeIndex};

use crate::error::Error;
use crate::net::{Node, PetriNet};

/// A net node as drawn: places are circles, transitions are boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Place(String),
    Transition(String),
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Place(name) | Element::Transition(name) => f.write_str(name),
        }
    }
}

pub type Flow = PetGraph<Element, &'static str, Directed>;

pub fn to_petgraph(net: &PetriNet) -> Flow {
    let mut graph = Flow::new();
    let mut indices: HashMap<Node, NodeIndex> = HashMap::new();

    for (id, place) in net.places() {
        let index = graph.add_node(Element::Place(place.name().to_string()));
        indices.insert(Node::Place(id), index);
    }
    for (id, transition) in net.transitions() {
        let index = graph.add_node(Element::Transition(transition.name().to_string()));
        indices.insert(Node::Transition(id), index);
    }
    for arc in net.arcs() {
        if let (Some(&source), Some(&target)) = (indices.get(&arc.source), indices.get(&arc.target))
        {
            graph.add_edge(source, target, "");
        }
    }

    graph
}

pub fn render_graph(graph: &Flow) -> String {
    let dot = Dot::with_attr_getters(
        graph,
        &[Config::EdgeNoLabel],
        &|_, _| String::new(),
        &|_, (_, element)| match element {
            Element::Place(_) => "shape = circle".to_string(),
            Element::Transition(_) => "shape = box".to_string(),
        },
    );
    format!("{dot}")
}

pub fn render_to_svg(graph: &Flow) -> Result<String, Error> {
    let dot_string = render_graph(graph);
    let mut parser = DotParser::new(&dot_string);

    let tree = parser
        .process()
        .map_err(|e| Error::RenderError(format!("Unable to parse the DOT output: {e}")))?;
    let mut gb = GraphBuilder::new();
    gb.visit_graph(&tree);
    let mut visual_graph = gb.get();
    Ok(generate_svg(&mut visual_graph))
}

fn generate_svg(graph: &mut VisualGraph) -> String {
    let mut svg = SVGWriter::new();
    graph.do_it(false, false, false, &mut svg);
    svg.finalize()
}

pub fn render_svg_to_pdf(svg: impl AsRef<str>, output: &Path) -> Result<(), Error> {
    use svg2pdf::{ConversionOptions, PageOptions};

    let mut options = svg2pdf::usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = svg2pdf::usvg::Tree::from_str(svg.as_ref(), &options)
        .map_err(|e| Error::RenderError(format!("Invalid SVG: {e}")))?;

    let pdf = svg2pdf::to_pdf(&tree, ConversionOptions::default(), PageOptions::default())
        .map_err(|e| Error::RenderError(format!("Failed to render PDF: {e}")))?;
    std::fs::write(output, pdf)?;
    Ok(())
}
