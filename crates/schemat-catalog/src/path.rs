//! Path addressing into nested structures.
//!
//! A path is a sequence of [`Step`]s. String paths are split on
//! [`SEPARATOR`] and every segment becomes a [`Step::Key`]; a key step that
//! reaches a sequence is read as a decimal index. Positional access into a
//! catalog needs an explicit [`Step::Index`].

use std::fmt;

/// Separator between segments of a string path.
pub const SEPARATOR: char = '/';

/// One step of a path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    /// Look up by key (or by decimal index inside a sequence).
    Key(String),
    /// Look up by position.
    Index(usize),
}

impl Step {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Step::Key(k) => Some(k),
            Step::Index(_) => None,
        }
    }

    /// Interpret this step as a position, parsing key steps as decimals.
    pub fn as_position(&self) -> Option<usize> {
        match self {
            Step::Index(i) => Some(*i),
            Step::Key(k) => k.parse().ok(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Key(k) => write!(f, "{k}"),
            Step::Index(i) => write!(f, "#{i}"),
        }
    }
}

impl From<&str> for Step {
    fn from(key: &str) -> Self {
        Step::Key(key.to_string())
    }
}

impl From<String> for Step {
    fn from(key: String) -> Self {
        Step::Key(key)
    }
}

impl From<usize> for Step {
    fn from(pos: usize) -> Self {
        Step::Index(pos)
    }
}

/// Split a string path into key steps. Empty segments are ignored, so
/// `"a//b/"` and `"a/b"` address the same node.
pub fn parse(path: &str) -> Vec<Step> {
    path.split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .map(Step::from)
        .collect()
}

/// Render steps back to a human-readable string for error messages.
pub fn display(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// Anything that can be used as a path.
pub trait IntoPath {
    fn into_steps(self) -> Vec<Step>;
}

impl IntoPath for &str {
    fn into_steps(self) -> Vec<Step> {
        parse(self)
    }
}

impl IntoPath for &String {
    fn into_steps(self) -> Vec<Step> {
        parse(self)
    }
}

impl IntoPath for String {
    fn into_steps(self) -> Vec<Step> {
        parse(&self)
    }
}

impl IntoPath for usize {
    fn into_steps(self) -> Vec<Step> {
        vec![Step::Index(self)]
    }
}

impl IntoPath for Vec<Step> {
    fn into_steps(self) -> Vec<Step> {
        self
    }
}

impl IntoPath for &[Step] {
    fn into_steps(self) -> Vec<Step> {
        self.to_vec()
    }
}

impl<const N: usize> IntoPath for [Step; N] {
    fn into_steps(self) -> Vec<Step> {
        self.into()
    }
}
