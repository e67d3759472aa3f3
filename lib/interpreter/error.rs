use thiserror::Error;

/// Fatal runtime failures. They travel through `anyhow::Error`, so callers
/// recover the kind with `downcast_ref::<RuntimeError>()`.
#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ReferenceError: {0}")]
    Reference(String),
    #[error("RangeError: {0}")]
    Range(String),
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("ResourceError: {0}")]
    Resource(String),
}
