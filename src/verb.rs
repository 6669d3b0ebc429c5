//! Route verbs.
//!
//! A route is declared for one or more [`Verb`]s. Every variant but
//! [`Verb::All`] names exactly one HTTP method; `All` matches any method,
//! including extension methods the enum does not list.

use std::fmt;
use std::str::FromStr;

use http::Method;

/// An HTTP verb a route can be declared for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Verb {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
    /// Matches any method.
    All,
}

impl Verb {
    /// Returns the uppercase wire representation (e.g. `"GET"`), or `"ALL"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
            Self::All     => "ALL",
        }
    }

    /// The concrete method, `None` for [`Verb::All`].
    pub fn method(self) -> Option<Method> {
        match self {
            Self::Connect => Some(Method::CONNECT),
            Self::Delete  => Some(Method::DELETE),
            Self::Get     => Some(Method::GET),
            Self::Head    => Some(Method::HEAD),
            Self::Options => Some(Method::OPTIONS),
            Self::Patch   => Some(Method::PATCH),
            Self::Post    => Some(Method::POST),
            Self::Put     => Some(Method::PUT),
            Self::Trace   => Some(Method::TRACE),
            Self::All     => None,
        }
    }
}

/// Parses an uppercase verb string (e.g. `"GET"`, `"ALL"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Verb {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            "ALL"     => Ok(Self::All),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("GET", Verb::Get)]
    #[case("DELETE", Verb::Delete)]
    #[case("ALL", Verb::All)]
    fn parses_wire_names(#[case] wire: &str, #[case] verb: Verb) {
        assert_eq!(wire.parse::<Verb>(), Ok(verb));
        assert_eq!(verb.as_str(), wire);
    }

    #[test]
    fn lowercase_is_rejected() {
        assert!("get".parse::<Verb>().is_err());
    }

    #[test]
    fn all_has_no_single_method() {
        assert_eq!(Verb::All.method(), None);
        assert_eq!(Verb::Patch.method(), Some(Method::PATCH));
    }
}
