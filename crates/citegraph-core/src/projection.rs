//! The relationship projector.
//!
//! Turns the edges incident on a group into the label-keyed summary stored in
//! index documents: `{"cites": [{TargetID, History}], "isCitedBy": [...]}`.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
  group::GroupId,
  relation::{Direction, Relation, RelationVocabulary},
  relationship::{GroupRelationship, History},
  store::GraphStore,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelationshipTarget {
  #[serde(rename = "TargetID")]
  pub target_id: GroupId,
  pub history:   History,
}

/// Relation label → targets, sorted by target id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RelationshipSummary(pub BTreeMap<String, Vec<RelationshipTarget>>);

impl RelationshipSummary {
  pub fn targets(&self, label: &str) -> &[RelationshipTarget] {
    self.0.get(label).map(Vec::as_slice).unwrap_or_default()
  }
}

/// Project the edges of `group`. Edges not incident on `group`, and edges
/// whose relation has no labels in `vocab`, are ignored.
pub fn project(
  group: GroupId,
  relationships: &[GroupRelationship],
  vocab: &RelationVocabulary,
) -> RelationshipSummary {
  let mut summary: BTreeMap<String, Vec<RelationshipTarget>> = BTreeMap::new();
  for rel in relationships {
    let (direction, other) = if rel.source_id == group {
      (Direction::Outward, rel.target_id)
    } else if rel.target_id == group {
      (Direction::Inward, rel.source_id)
    } else {
      continue;
    };
    let Some(label) = vocab.label(rel.relation, direction) else {
      continue;
    };
    summary.entry(label.to_owned()).or_default().push(RelationshipTarget {
      target_id: other,
      history:   rel.history.clone(),
    });
  }
  for targets in summary.values_mut() {
    targets.sort_by_key(|t| t.target_id);
  }
  RelationshipSummary(summary)
}

/// Load and project one group. `None` if the group does not exist.
pub async fn project_group<S: GraphStore>(
  store: &S,
  group: GroupId,
  vocab: &RelationVocabulary,
) -> Result<Option<RelationshipSummary>, S::Error> {
  let view = store.group_view(group).await?;
  Ok(view.map(|v| project(group, &v.relationships, vocab)))
}

// ─── Citations ───────────────────────────────────────────────────────────────

/// A group citing the queried one, with its canonical metadata and the
/// evidence of the citation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Citation {
  #[serde(rename = "GroupID")]
  pub group_id: GroupId,
  pub metadata: Map<String, Value>,
  pub history:  History,
}

/// The work type named by a metadata document: `Type.Name`, or `Type` when
/// it is a bare string.
pub fn type_name(document: &Map<String, Value>) -> Option<&str> {
  match document.get("Type")? {
    Value::String(name) => Some(name.as_str()),
    Value::Object(fields) => fields.get("Name")?.as_str(),
    _ => None,
  }
}

/// Groups citing `group`, read from the inward `Cites` label of its
/// projection. With `target_type`, only citing groups whose metadata names
/// that type are kept. `None` if `group` does not exist.
pub async fn citations<S: GraphStore>(
  store: &S,
  group: GroupId,
  vocab: &RelationVocabulary,
  target_type: Option<&str>,
) -> Result<Option<Vec<Citation>>, S::Error> {
  let Some(summary) = project_group(store, group, vocab).await? else {
    return Ok(None);
  };
  let Some(label) = vocab.label(Relation::Cites, Direction::Inward) else {
    return Ok(Some(Vec::new()));
  };

  let mut found = Vec::new();
  for target in summary.targets(label) {
    let Some(view) = store.group_view(target.target_id).await? else {
      continue;
    };
    let metadata = view.canonical_metadata().map(|m| m.document.clone()).unwrap_or_default();
    if target_type.is_some_and(|wanted| type_name(&metadata) != Some(wanted)) {
      continue;
    }
    found.push(Citation {
      group_id: target.target_id,
      metadata,
      history: target.history.clone(),
    });
  }
  Ok(Some(found))
}
