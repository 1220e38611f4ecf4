//! Error reporting for query entry points that terminate without running.

/// Returned by entry points whose query kind this checker cannot perform.
/// The result object passed to such a call is left untouched.
#[derive(Debug, PartialEq, Eq)]
pub enum QueryError {
    /// The requested query kind has no implementation in this checker.
    Unsupported(&'static str),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            QueryError::Unsupported(what) =>
                write!(f, "Unsupported query: {}", what),
        }
    }
}

impl std::error::Error for QueryError {}
