//! A persistent identifier: a `(scheme, value)` pair such as `doi:10.5281/zenodo.1120265`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A persistent identifier. Unique per scheme + value; owned by exactly one
/// identity group at any time.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Identifier {
  /// Lowercase scheme name, e.g. `doi`, `arxiv`, `url`.
  pub scheme: String,
  pub value:  String,
}

impl Identifier {
  /// Build an identifier, normalising the scheme to lowercase and trimming
  /// surrounding whitespace from both parts.
  pub fn new(scheme: impl AsRef<str>, value: impl AsRef<str>) -> Self {
    Self {
      scheme: scheme.as_ref().trim().to_lowercase(),
      value:  value.as_ref().trim().to_owned(),
    }
  }
}

impl fmt::Display for Identifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.scheme, self.value)
  }
}
