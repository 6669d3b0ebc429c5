//! Instance lifetimes.

use std::fmt;

/// How long a resolved instance is reused.
///
/// | Lifetime | Cached in | Constructed |
/// |---|---|---|
/// | `Singleton` | the root [`Container`](crate::Container) | at most once per container |
/// | `Scoped` | the [`Scope`](crate::Scope) | at most once per scope (request) |
/// | `Transient` | nowhere | on every resolution |
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Lifetime {
    Singleton,
    Scoped,
    #[default]
    Transient,
}

impl Lifetime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Scoped    => "scoped",
            Self::Transient => "transient",
        }
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
