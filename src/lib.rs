pub mod activity;
pub mod compiler;
mod error;
pub mod net;
pub mod parser;
mod render;
mod validate;

use std::path::{Path, PathBuf};

pub use activity::{Activity, ActivityKind, Registry, Scope};
pub use compiler::{compile, compile_source};
pub use error::{Error, NetError, ValidationError, ValidationErrorKind};
pub use net::owfn::{Owfn, OwfnDocument, OwfnOptions, OwfnTransition};
pub use net::{CommunicationType, NetStatistics, PetriNet};
pub use render::{Element, Flow};
pub use validate::ValidationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Owfn,
    Dot,
    Pdf,
}

impl Format {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Format::Owfn => "owfn",
            Format::Dot => "dot",
            Format::Pdf => "pdf",
        }
    }
}

/// A net that went through compilation and validation.
pub struct CompiledNet {
    net: PetriNet,
}

impl CompiledNet {
    #[must_use]
    pub fn to_owfn(&self, options: OwfnOptions) -> String {
        Owfn::new(&self.net, options).to_string()
    }

    #[must_use]
    pub fn to_petgraph(&self) -> Flow {
        render::to_petgraph(&self.net)
    }

    #[must_use]
    pub fn render_to_dot(&self) -> String {
        render::render_graph(&self.to_petgraph())
    }

    pub fn render_to_svg(&self) -> Result<String, Error> {
        render::render_to_svg(&self.to_petgraph())
    }

    #[must_use]
    pub fn statistics(&self) -> NetStatistics {
        self.net.statistics()
    }

    #[must_use]
    pub fn net(&self) -> &PetriNet {
        &self.net
    }
}

pub fn compile_and_validate(input: &str, registry: &Registry) -> Result<CompiledNet, Error> {
    let net = compile_source(input, registry)?;
    Ok(CompiledNet { net })
}

pub fn render_to_pdf(svg: &str, path: &Path) -> Result<(), Error> {
    render::render_svg_to_pdf(svg, path)
}

/// Compiles `input` and writes it to `output` in `format`.
pub fn process_workflow(
    input: &str,
    registry: &Registry,
    output: &Path,
    format: Format,
    options: OwfnOptions,
) -> Result<(), Error> {
    let compiled = compile_and_validate(input, registry)?;

    match format {
        Format::Owfn => std::fs::write(output, compiled.to_owfn(options))?,
        Format::Dot => std::fs::write(output, compiled.render_to_dot())?,
        Format::Pdf => render_to_pdf(&compiled.render_to_svg()?, output)?,
    }

    log::info!("wrote {}", output.display());
    Ok(())
}

/// Net size of a previously written oWFN file.
pub fn read_statistics(input: &str) -> Result<NetStatistics, Error> {
    Ok(OwfnDocument::parse(input)?.statistics())
}

pub fn format_from_ext(ext: &str) -> Result<Format, Error> {
    match ext {
        "owfn" => Ok(Format::Owfn),
        "dot" => Ok(Format::Dot),
        "pdf" => Ok(Format::Pdf),
        _ => Err(Error::InvalidType(ext.to_string())),
    }
}

/// `input` with the extension of `format`, or `workflow.<ext>` for
/// inline sources.
#[must_use]
pub fn default_output(input: Option<&Path>, format: Format) -> PathBuf {
    input
        .unwrap_or_else(|| Path::new("workflow"))
        .with_extension(format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_ext() {
        assert_eq!(format_from_ext("owfn").unwrap(), Format::Owfn);
        assert_eq!(format_from_ext("pdf").unwrap(), Format::Pdf);
        assert!(matches!(format_from_ext("png"), Err(Error::InvalidType(_))));
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Some(Path::new("flows/order.xaml")), Format::Owfn),
            PathBuf::from("flows/order.owfn")
        );
        assert_eq!(default_output(None, Format::Dot), PathBuf::from("workflow.dot"));
    }
}
