use thiserror::Error;

/// Error taxonomy for the registration engine.
///
/// `NotFound` (unresolved source/target file path) is deliberately absent —
/// path resolution belongs to the out-of-scope HTTP/I/O layer that calls into
/// this crate. Everything here is raised by the engine itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("required input missing or length-mismatched: {0}")]
    InputMissing(String),
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
