//! Ties the stages together: markup to tokens, tokens to an activity tree,
//! activity tree to a validated net.

use crate::activity::{Activity, Registry, Scope, splice};
use crate::error::Error;
use crate::net::PetriNet;
use crate::parser::{grammar, parse_document, screen};

/// Compiles `root` under scope 0.
///
/// The boundary's `initialized` place carries the only initial token and
/// its `closed` place forms the single final set. The finished net is
/// validated before it is returned.
pub fn compile(root: &dyn Activity) -> Result<PetriNet, Error> {
    let mut net = PetriNet::new();
    let boundary = Scope::open(&mut net)?;
    let (initialized, closed) = (boundary.initialized(), boundary.closed());

    net.set_tokens(&initialized, 1)?;
    net.add_final_set([&closed])?;
    splice(&mut net, root, &initialized, &closed)?;

    net.validate()?;
    log::info!("compiled net: {}", net.statistics());
    Ok(net)
}

/// Scans, screens, parses and compiles one XAML document.
pub fn compile_source(source: &str, registry: &Registry) -> Result<PetriNet, Error> {
    let tokens = screen::screen(grammar::scan(source)?);
    let root = parse_document(tokens, registry)?;
    log::debug!("parsed root activity '{}'", root.local_name());
    compile(root.as_ref())
}
