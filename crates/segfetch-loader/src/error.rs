use thiserror::Error;

/// Errors returned by coordinator entry points. Load failures themselves
/// are reported through callbacks and events, not through these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("coordinator destroyed")]
    Destroyed,
}

pub type LoadResult<T> = Result<T, LoadError>;
