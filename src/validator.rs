//! Composable predicates over raw protocol frames.
//!
//! A [`Validator`] is a small expression tree built from literal tests, a
//! regex search and boolean combinators. Evaluation is pure and total: it
//! never fails and never allocates beyond the lossy UTF-8 view of binary
//! payloads. Construction is the only fallible step (an invalid regex).
//!
//! ```
//! use optio::validator::Validator;
//!
//! let greeting = Validator::all(vec![
//!     Validator::regex(r"([A-Z])\w+").unwrap(),
//!     Validator::starts_with("Hello"),
//! ]);
//! assert!(greeting.check("Hello World"));
//! assert!(!greeting.check("hello World"));
//! ```

use regex::Regex;

use crate::Result;
use crate::models::frame::Frame;

/// A predicate over frame text.
#[derive(Debug, Clone, Default)]
pub enum Validator {
    /// Matches everything.
    #[default]
    None,
    /// Matches if the pattern is found anywhere in the text.
    Regex(Regex),
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    Not(Box<Validator>),
    /// Matches if every child matches. Empty is true.
    All(Vec<Validator>),
    /// Matches if at least one child matches. Empty is false.
    Any(Vec<Validator>),
}

impl Validator {
    #[must_use]
    pub fn none() -> Self {
        Validator::None
    }

    /// Compiles `pattern` into a search validator.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::Regex`](crate::OptioError::Regex) if the
    /// pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        Ok(Validator::Regex(Regex::new(pattern)?))
    }

    #[must_use]
    pub fn starts_with(prefix: impl Into<String>) -> Self {
        Validator::StartsWith(prefix.into())
    }

    #[must_use]
    pub fn ends_with(suffix: impl Into<String>) -> Self {
        Validator::EndsWith(suffix.into())
    }

    #[must_use]
    pub fn contains(needle: impl Into<String>) -> Self {
        Validator::Contains(needle.into())
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(inner: Validator) -> Self {
        Validator::Not(Box::new(inner))
    }

    #[must_use]
    pub fn all(children: Vec<Validator>) -> Self {
        Validator::All(children)
    }

    #[must_use]
    pub fn any(children: Vec<Validator>) -> Self {
        Validator::Any(children)
    }

    /// Tests the predicate against `text`.
    pub fn check(&self, text: &str) -> bool {
        match self {
            Validator::None => true,
            Validator::Regex(re) => re.is_match(text),
            Validator::StartsWith(prefix) => text.starts_with(prefix.as_str()),
            Validator::EndsWith(suffix) => text.ends_with(suffix.as_str()),
            Validator::Contains(needle) => text.contains(needle.as_str()),
            Validator::Not(inner) => !inner.check(text),
            Validator::All(children) => children.iter().all(|v| v.check(text)),
            Validator::Any(children) => children.iter().any(|v| v.check(text)),
        }
    }

    /// Tests the predicate against a frame's payload.
    pub fn evaluate(&self, frame: &Frame) -> bool {
        match self {
            // skip the lossy decode for the wildcard
            Validator::None => true,
            _ => self.check(&frame.payload().as_text()),
        }
    }
}
