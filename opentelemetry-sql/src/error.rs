//! Errors returned by wrapped drivers and by the instrumentation layer.
use thiserror::Error;

/// A specialized `Result` type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by backend drivers and by the instrumentation layer.
///
/// Errors coming from the backend are returned to the caller untouched, the
/// instrumentation only records them.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The backend has no fast path for the requested operation.
    ///
    /// Callers should fall back to the generic code path, e.g. preparing a
    /// statement instead of executing the query directly. This is not a
    /// failure of the operation.
    #[error("driver: skip fast-path; continue as if unimplemented")]
    Skip,

    /// The connection is in a bad state and should not be reused.
    #[error("driver: bad connection")]
    BadConnection,

    /// No driver is registered under the given name.
    #[error("driver {0:?} is not registered")]
    DriverNotFound(String),

    /// A driver is already registered under the given name.
    #[error("driver {0:?} is already registered")]
    DuplicateDriver(String),

    /// Every instrumented name derived from the driver name is taken.
    #[error("unable to register driver {0:?}, all slots have been taken")]
    RegistryFull(String),

    /// An error raised by the backend driver.
    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// Other failures not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Returns `true` if this is the [`Error::Skip`] sentinel.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Skip)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Other(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Other(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_is_transparent() {
        let err = Error::from(Box::<dyn std::error::Error + Send + Sync>::from("exec error"));

        assert_eq!(err.to_string(), "exec error");
        assert!(!err.is_skip());
    }

    #[test]
    fn skip_is_recognized() {
        assert!(Error::Skip.is_skip());
        assert!(!Error::from("skip").is_skip());
    }
}
