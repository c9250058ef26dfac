//! Intake events and their conversion into claims.
//!
//! An event is an envelope of one or more links in the Scholix-style shape
//! providers submit:
//!
//! ```json
//! {
//!   "ID": "…", "EventType": "RelationshipCreated", "Time": "…",
//!   "Payload": [{
//!     "Source": {"Identifier": {"ID": "10.1/a", "IDScheme": "doi"}, "Title": "…"},
//!     "RelationshipType": {"Name": "References", "SubType": "Cites"},
//!     "Target": {"Identifier": {"ID": "10.1/b", "IDScheme": "doi"}},
//!     "LinkPublicationDate": "2018-01-01"
//!   }]
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use citegraph_core::{
  claim::Claim,
  identifier::Identifier,
  relation::Relation,
  relationship::Evidence,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

/// Endpoint metadata fields a link may set on its endpoints' groups.
pub const OVERRIDABLE_KEYS: [&str; 5] = ["Type", "Title", "Creator", "PublicationDate", "Publisher"];

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
pub enum EventType {
  RelationshipCreated,
  RelationshipDeleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
  #[serde(rename = "ID")]
  pub id:         Uuid,
  pub event_type: EventType,
  pub time:       DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub creator:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source:     Option<String>,
  pub payload:    Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Link {
  pub source:                ObjectRef,
  pub relationship_type:     RelationshipType,
  pub target:                ObjectRef,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link_publication_date: Option<NaiveDate>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link_provider:         Option<Value>,
  #[serde(default, rename = "LicenseURL", skip_serializing_if = "Option::is_none")]
  pub license_url:           Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelationshipType {
  pub name:            String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sub_type:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sub_type_schema: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
  #[serde(rename = "Identifier")]
  pub identifier: IdentifierRef,
  /// Descriptive fields (`Title`, `Type`, ...). Only [`OVERRIDABLE_KEYS`]
  /// reach the graph.
  #[serde(flatten)]
  pub fields:     Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierRef {
  #[serde(rename = "ID")]
  pub id:        String,
  #[serde(rename = "IDScheme")]
  pub id_scheme: String,
}

impl ObjectRef {
  pub fn identifier(&self) -> Identifier {
    Identifier::new(&self.identifier.id_scheme, &self.identifier.id)
  }

  fn overridable_fields(&self) -> Map<String, Value> {
    self
      .fields
      .iter()
      .filter(|(k, _)| OVERRIDABLE_KEYS.contains(&k.as_str()))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}

impl RelationshipType {
  /// `SubType` wins when it names a known relation; providers often put the
  /// precise relation there and a coarse one in `Name`.
  pub fn relation_name(&self) -> &str {
    match &self.sub_type {
      Some(sub) if Relation::parse_name(sub).is_ok() => sub.as_str(),
      _ => self.name.as_str(),
    }
  }
}

// ─── Conversion ──────────────────────────────────────────────────────────────

impl Event {
  /// Convert every link into a claim. Fails without side effects if any link
  /// is malformed.
  pub fn claims(&self, max_links: usize) -> Result<Vec<Claim>> {
    if self.event_type != EventType::RelationshipCreated {
      return Err(Error::InvalidEvent(format!("unsupported event type {}", self.event_type)));
    }
    if self.payload.is_empty() || self.payload.len() > max_links {
      return Err(Error::InvalidEvent(format!(
        "payload must hold between 1 and {max_links} links, got {}",
        self.payload.len()
      )));
    }
    self
      .payload
      .iter()
      .enumerate()
      .map(|(index, link)| self.claim(index, link))
      .collect()
  }

  fn claim(&self, index: usize, link: &Link) -> Result<Claim> {
    let source = link.source.identifier();
    let target = link.target.identifier();
    if source.value.is_empty() || target.value.is_empty() {
      return Err(Error::InvalidEvent(format!("link {index} has an empty identifier")));
    }

    let mut claim = Claim::from_named(
      link.relationship_type.relation_name(),
      source.clone(),
      target.clone(),
      self.evidence(index, link),
    )?;
    claim.set_metadata(&source, link.source.overridable_fields());
    claim.set_metadata(&target, link.target.overridable_fields());
    Ok(claim)
  }

  /// Evidence ids are derived from the event id and link position, so
  /// re-submitting an event records nothing new.
  fn evidence(&self, index: usize, link: &Link) -> Evidence {
    let evidence_id = Uuid::new_v5(&self.id, index.to_string().as_bytes());
    let asserted_at = link
      .link_publication_date
      .and_then(|d| d.and_hms_opt(0, 0, 0))
      .map(|dt| dt.and_utc())
      .unwrap_or(self.time);

    let mut evidence = Evidence::new(evidence_id, asserted_at);
    evidence.provider = self.source.clone();
    evidence.payload.insert("EventID".into(), Value::String(self.id.to_string()));
    if let Some(date) = link.link_publication_date {
      evidence.payload.insert("LinkPublicationDate".into(), Value::String(date.to_string()));
    }
    if let Some(provider) = &link.link_provider {
      evidence.payload.insert("LinkProvider".into(), provider.clone());
    }
    if let Some(license) = &link.license_url {
      evidence.payload.insert("LicenseURL".into(), Value::String(license.clone()));
    }
    evidence
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn event(payload: Value) -> Event {
    serde_json::from_value(json!({
      "ID": "8f2b6a7e-3a65-4d0c-9d42-6a1f0f9b6c11",
      "EventType": "RelationshipCreated",
      "Time": "2018-03-01T12:00:00Z",
      "Source": "crossref",
      "Payload": payload,
    }))
    .unwrap()
  }

  fn link(name: &str, sub_type: Option<&str>) -> Value {
    json!({
      "Source": {
        "Identifier": {"ID": "10.1/A", "IDScheme": "DOI"},
        "Title": "Source paper",
        "Keywords": ["ignored"],
      },
      "RelationshipType": {"Name": name, "SubType": sub_type},
      "Target": {"Identifier": {"ID": "10.5281/zenodo.1", "IDScheme": "doi"}},
      "LinkPublicationDate": "2018-01-15",
      "LicenseURL": "https://creativecommons.org/publicdomain/zero/1.0/",
    })
  }

  #[test]
  fn converts_links_to_claims() {
    let claims = event(json!([link("References", Some("Cites"))])).claims(10).unwrap();
    assert_eq!(claims.len(), 1);
    let c = &claims[0];
    assert_eq!(c.relation, Relation::Cites);
    assert_eq!(c.source, Identifier::new("doi", "10.1/A"));
    assert_eq!(c.evidence.asserted_at, Utc.with_ymd_and_hms(2018, 1, 15, 0, 0, 0).unwrap());
    assert_eq!(c.evidence.provider.as_deref(), Some("crossref"));
    assert_eq!(c.evidence.payload["LicenseURL"], "https://creativecommons.org/publicdomain/zero/1.0/");

    let metadata = c.source_metadata.as_ref().unwrap();
    assert_eq!(metadata["Title"], "Source paper");
    assert!(!metadata.contains_key("Keywords"));
    assert!(c.target_metadata.is_none());
  }

  #[test]
  fn unknown_sub_type_falls_back_to_name() {
    let claims = event(json!([link("IsCitedBy", Some("software"))])).claims(10).unwrap();
    assert_eq!(claims[0].relation, Relation::Cites);
    assert_eq!(claims[0].source, Identifier::new("doi", "10.5281/zenodo.1"));
    assert_eq!(claims[0].target_metadata.as_ref().unwrap()["Title"], "Source paper");
  }

  #[test]
  fn evidence_ids_are_stable_per_position() {
    let e = event(json!([link("Cites", None), link("Cites", None)]));
    let first = e.claims(10).unwrap();
    let second = e.claims(10).unwrap();
    assert_eq!(first[0].evidence.evidence_id, second[0].evidence.evidence_id);
    assert_ne!(first[0].evidence.evidence_id, first[1].evidence.evidence_id);
  }

  #[test]
  fn missing_publication_date_uses_event_time() {
    let mut l = link("Cites", None);
    l.as_object_mut().unwrap().remove("LinkPublicationDate");
    let claims = event(json!([l])).claims(10).unwrap();
    assert_eq!(claims[0].evidence.asserted_at, Utc.with_ymd_and_hms(2018, 3, 1, 12, 0, 0).unwrap());
  }

  #[test]
  fn rejects_bad_envelopes() {
    assert!(matches!(event(json!([])).claims(10), Err(Error::InvalidEvent(_))));
    let three = event(json!([link("Cites", None), link("Cites", None), link("Cites", None)]));
    assert!(matches!(three.claims(2), Err(Error::InvalidEvent(_))));

    let mut deleted = event(json!([link("Cites", None)]));
    deleted.event_type = EventType::RelationshipDeleted;
    assert!(matches!(deleted.claims(10), Err(Error::InvalidEvent(_))));
  }

  #[test]
  fn unknown_relation_fails_whole_event() {
    let e = event(json!([link("Cites", None), link("Likes", None)]));
    assert!(matches!(
      e.claims(10),
      Err(Error::Core(citegraph_core::Error::InvalidRelation(_)))
    ));
  }
}
