//! Schema validation primitives shared by request extraction and configuration.
//!
//! A validation failure is a list of [`Violation`]s, each naming the offending
//! field path and the reason it was rejected. The error pipeline renders a
//! [`Violations`] list as a single client-facing message:
//!
//! ```text
//! name: must not be empty, limits.max: must be greater than 0
//! ```

use std::fmt;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field (e.g. `limits.max`).
    pub path: String,
    /// Why the value was rejected.
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// An ordered collection of violations produced by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation for `path`.
    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(Violation::new(path, message));
    }

    /// Append every violation from `other`.
    pub fn extend(&mut self, other: Violations) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Violations> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Render as `path: message` pairs joined by `", "`.
    pub fn summary(&self) -> String {
        self.0
            .iter()
            .map(Violation::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for Violations {}

impl From<Violation> for Violations {
    fn from(violation: Violation) -> Self {
        Self(vec![violation])
    }
}

impl FromIterator<Violation> for Violations {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Types that can check their own invariants after deserialization.
///
/// Used by [`crate::extract::ValidJson`] to reject structurally valid but
/// semantically invalid request bodies.
pub trait Validate {
    fn validate(&self) -> Result<(), Violations>;
}
