use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    IllegalArc,
    DanglingArc,
    InconsistentFlow,
    StaleFinalPlace,
    StaleName,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

/// Failures of the net engine's own preconditions.
///
/// A well-formed activity never triggers one of these; seeing one means a
/// compile rule addressed a place or transition that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("node name cannot be empty")]
    EmptyName,

    #[error("place '{0}' already exists")]
    DuplicatePlace(String),

    #[error("no place known as '{0}'")]
    MissingPlace(String),

    #[error("no transition with handle {0}")]
    MissingTransition(usize),

    #[error("arc from place '{0}' to place '{1}' is not allowed")]
    PlaceToPlace(String, String),

    #[error("arc from transition '{0}' to transition '{1}' is not allowed")]
    TransitionToTransition(String, String),

    #[error("cannot merge {kind_a} place '{a}' with {kind_b} place '{b}'")]
    IncompatibleMerge {
        a: String,
        kind_a: &'static str,
        b: String,
        kind_b: &'static str,
    },

    #[error("final set cannot be empty")]
    EmptyFinalSet,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{message} (activity '{activity}', token {position})")]
    Structural {
        message: String,
        activity: String,
        position: usize,
    },

    #[error("no module found for '{qname}' (activity '{activity}', token {position})")]
    Resolution {
        qname: String,
        activity: String,
        position: usize,
    },

    #[error("Net error: {0}")]
    Net(#[from] NetError),

    #[error("Errors: {0:#?}")]
    InvalidNet(Vec<ValidationError>),

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Scan error: {0}")]
    ScanError(String),

    #[error("oWFN syntax error: {0}")]
    OwfnSyntax(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Vec<ValidationError>> for Error {
    fn from(errors: Vec<ValidationError>) -> Self {
        Error::InvalidNet(errors)
    }
}
