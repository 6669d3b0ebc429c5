//! Unified error type.

use std::borrow::Cow;
use std::fmt;

use crate::invoker::MethodName;

/// Boxed error produced by user constructors and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by kura's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// wiring failures: a request that never got a scope, a method the resolved
/// controller does not have, a dependency graph that cannot be satisfied, and
/// the server's own I/O.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The invoker ran against a context that never passed through
    /// `scope_per_request` or `attach_container`.
    #[error("no scope attached to the request context while invoking `{method}`")]
    MissingScope { method: MethodName },

    /// The resolved instance has no invocable method by that name.
    #[error("`{method}` is not an invocable method on `{target}`")]
    InvalidMethod {
        method: MethodName,
        target: &'static str,
    },

    /// Nothing is registered under `name`.
    #[error("could not resolve `{name}`: not registered (resolution path: {path})")]
    Unregistered {
        name: Cow<'static, str>,
        path: ResolutionPath,
    },

    /// Resolving `path`'s last element requires itself.
    #[error("circular dependency: {path}")]
    CircularDependency { path: ResolutionPath },

    #[error("resolution depth limit of {limit} exceeded: {path}")]
    DepthExceeded { limit: usize, path: ResolutionPath },

    /// `name` resolved, but to a different type than the caller asked for.
    #[error("`{name}` resolves to `{actual}`, not `{expected}`")]
    TypeMismatch {
        name: Cow<'static, str>,
        expected: &'static str,
        actual: &'static str,
    },

    /// A constructor or factory reported a failure of its own.
    #[error("failed to construct `{target}`")]
    Construction {
        target: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("invalid controller pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to read request body")]
    Body(#[source] BoxError),

    /// The request body is longer than the server accepts.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps a failure raised while building `T`.
    ///
    /// ```rust
    /// # use kura::{Cradle, Error};
    /// struct Config { port: u16 }
    ///
    /// fn config(_: &Cradle<'_>) -> Result<Config, Error> {
    ///     let port = "80x".parse::<u16>().map_err(Error::construction::<Config>)?;
    ///     Ok(Config { port })
    /// }
    /// ```
    pub fn construction<T>(source: impl Into<BoxError>) -> Self {
        Self::Construction {
            target: std::any::type_name::<T>(),
            source: source.into(),
        }
    }
}

/// The chain of registrations being resolved when an error occurred,
/// outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionPath(pub(crate) Vec<Cow<'static, str>>);

impl ResolutionPath {
    pub fn segments(&self) -> &[Cow<'static, str>] {
        &self.0
    }
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_renders_outermost_first() {
        let path = ResolutionPath(vec!["users".into(), "repo".into(), "db".into()]);
        assert_eq!(path.to_string(), "users -> repo -> db");
    }

    #[test]
    fn invalid_method_names_the_method() {
        let err = Error::InvalidMethod { method: "delete".into(), target: "Users" };
        assert_eq!(err.to_string(), "`delete` is not an invocable method on `Users`");
    }

    #[test]
    fn construction_keeps_its_source() {
        let err = Error::construction::<u8>("bad port");
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "failed to construct `u8`");
    }
}
