//! Claims: a single asserted relation between two identifiers.

use serde_json::{Map, Value};

use crate::{
  Result,
  identifier::Identifier,
  relation::Relation,
  relationship::Evidence,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
  pub relation:        Relation,
  pub source:          Identifier,
  pub target:          Identifier,
  pub evidence:        Evidence,
  /// Descriptive fields to attach to the source's final owning group.
  pub source_metadata: Option<Map<String, Value>>,
  pub target_metadata: Option<Map<String, Value>>,
}

impl Claim {
  pub fn new(
    relation: Relation,
    source: Identifier,
    target: Identifier,
    evidence: Evidence,
  ) -> Self {
    Self {
      relation,
      source,
      target,
      evidence,
      source_metadata: None,
      target_metadata: None,
    }
  }

  /// Build a claim from a relation name, normalising inverse aliases
  /// (`IsCitedBy`, ...) by swapping the endpoints.
  pub fn from_named(
    name: &str,
    source: Identifier,
    target: Identifier,
    evidence: Evidence,
  ) -> Result<Self> {
    let (relation, swapped) = Relation::parse_name(name)?;
    Ok(if swapped {
      Self::new(relation, target, source, evidence)
    } else {
      Self::new(relation, source, target, evidence)
    })
  }

  /// Attach metadata to whichever endpoint is `identifier`. Does nothing if
  /// `identifier` is not an endpoint of this claim.
  pub fn set_metadata(&mut self, identifier: &Identifier, fields: Map<String, Value>) {
    if fields.is_empty() {
      return;
    }
    if *identifier == self.source {
      self.source_metadata = Some(fields);
    } else if *identifier == self.target {
      self.target_metadata = Some(fields);
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;
  use uuid::Uuid;

  use super::*;

  fn evidence() -> Evidence { Evidence::new(Uuid::from_u128(1), Utc::now()) }

  #[test]
  fn inverse_alias_swaps() {
    let a = Identifier::new("doi", "10.1/a");
    let b = Identifier::new("doi", "10.1/b");
    let claim = Claim::from_named("IsCitedBy", a.clone(), b.clone(), evidence()).unwrap();
    assert_eq!(claim.relation, Relation::Cites);
    assert_eq!(claim.source, b);
    assert_eq!(claim.target, a);
  }

  #[test]
  fn metadata_follows_identifier_after_swap() {
    let a = Identifier::new("doi", "10.1/a");
    let b = Identifier::new("doi", "10.1/b");
    let mut claim = Claim::from_named("IsVersionOf", a.clone(), b, evidence()).unwrap();
    let fields = json!({"Title": "A"}).as_object().cloned().unwrap();
    claim.set_metadata(&a, fields.clone());
    assert_eq!(claim.target_metadata, Some(fields));
    assert_eq!(claim.source_metadata, None);
  }
}
