//! Declarative legacy → local field mapping.
//!
//! A [`MappingDocument`] is the JSON shape on disk. It is validated once into
//! a [`MappingSet`] of per-entity [`FieldMappingPlan`]s whose bindings point
//! at the static column catalogue, so nothing downstream deals with unknown
//! columns.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ColumnKind, ColumnSpec, EntityKind};

const EMBEDDED_MAPPING: &str = include_str!("../../data/legacy-mapping.json");

/// Mapping file as written on disk, keyed by legacy table name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MappingDocument {
    pub tables: BTreeMap<String, TableMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TableMapping {
    /// Local entity name (`projects`, `people`, ...)
    pub entity: String,
    pub pk: PrimaryKeyMapping,
    pub modified_ts: String,
    #[serde(default)]
    pub created_ts: Option<String>,
    #[serde(default)]
    pub field_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PrimaryKeyMapping {
    #[serde(alias = "remote")]
    pub legacy: String,
    pub local: String,
}

/// One remote field bound to a local column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub remote: String,
    pub column: &'static ColumnSpec,
}

/// Validated mapping for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMappingPlan {
    pub entity: EntityKind,
    pub remote_table: String,
    pub remote_pk: String,
    pub pk_column: &'static ColumnSpec,
    pub remote_modified: String,
    pub remote_created: Option<String>,
    /// Every binding including the primary key and timestamps, remote pk
    /// first.
    pub bindings: Vec<FieldBinding>,
}

impl FieldMappingPlan {
    /// Remote fields to request, in a stable order.
    pub fn requested_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            if !fields.contains(&binding.remote.as_str()) {
                fields.push(&binding.remote);
            }
        }
        fields
    }

    /// Fields without which a row cannot be keyed or ordered.
    pub fn required_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.remote_pk.as_str(), self.remote_modified.as_str()];
        for remote in self.merge_key() {
            if !fields.contains(&remote) {
                fields.push(remote);
            }
        }
        fields
    }

    /// Remote fields bound to the entity's local key columns, in key order.
    ///
    /// Used to line up rows from separate chunked requests.
    pub fn merge_key(&self) -> Vec<&str> {
        self.entity
            .key_columns()
            .iter()
            .filter_map(|column| self.binding_for(column))
            .map(|binding| binding.remote.as_str())
            .collect()
    }

    pub fn binding_for(&self, column: &str) -> Option<&FieldBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.column.name == column)
    }

    fn build(remote_table: &str, table: &TableMapping) -> Result<Self> {
        let invalid = |message: String| Error::Mapping(format!("{remote_table}: {message}"));

        let remote_table_name = required_name(remote_table, "table name")
            .map_err(|_| Error::Mapping("table name must not be empty".to_string()))?;
        let entity: EntityKind = table.entity.parse().map_err(invalid)?;
        let remote_pk = required_name(&table.pk.legacy, "pk.legacy").map_err(invalid)?;
        let remote_modified = required_name(&table.modified_ts, "modified_ts").map_err(invalid)?;
        let remote_created = table
            .created_ts
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let pk_local = table.pk.local.trim();
        let pk_column = entity
            .column(pk_local)
            .ok_or_else(|| invalid(format!("unknown local column '{pk_local}' for {entity}")))?;
        if pk_column.kind != ColumnKind::Integer || !entity.key_columns().contains(&pk_column.name)
        {
            return Err(invalid(format!(
                "pk.local '{pk_local}' must be an integer key column of {entity}"
            )));
        }

        let mut bindings: Vec<FieldBinding> = Vec::with_capacity(table.field_map.len() + 3);
        let mut bind = |remote: &str, local: &str| -> Result<()> {
            let column = entity
                .column(local)
                .ok_or_else(|| invalid(format!("unknown local column '{local}' for {entity}")))?;
            if column.name == "imported_at" {
                return Err(invalid("imported_at is maintained by the sync engine".to_string()));
            }
            if column.name == "id" && entity.has_surrogate_id() {
                return Err(invalid(format!("{entity} ids are assigned locally")));
            }
            if let Some(existing) = bindings.iter().find(|binding| binding.column.name == local) {
                if existing.remote == remote {
                    return Ok(());
                }
                return Err(invalid(format!(
                    "local column '{local}' is bound to both '{}' and '{remote}'",
                    existing.remote
                )));
            }
            bindings.push(FieldBinding {
                remote: remote.to_string(),
                column,
            });
            Ok(())
        };

        bind(&remote_pk, pk_column.name)?;
        bind(&remote_modified, "modified_at")?;
        if let Some(created) = &remote_created {
            bind(created, "created_at")?;
        }
        for (remote, local) in &table.field_map {
            let remote = required_name(remote, "field_map key").map_err(invalid)?;
            let local = required_name(local, "field_map value").map_err(invalid)?;
            bind(&remote, &local)?;
        }

        Ok(Self {
            entity,
            remote_table: remote_table_name,
            remote_pk,
            pk_column,
            remote_modified,
            remote_created,
            bindings,
        })
    }
}

/// Validated plans for every mapped entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingSet {
    plans: BTreeMap<EntityKind, FieldMappingPlan>,
}

impl MappingSet {
    /// The mapping shipped with the crate.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_MAPPING)
    }

    /// Load a mapping file, or the embedded mapping when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|error| {
                    Error::Mapping(format!("cannot read {}: {error}", path.display()))
                })?;
                Self::from_json(&raw)
            }
            None => Self::embedded(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let document: MappingDocument = serde_json::from_str(raw)
            .map_err(|error| Error::Mapping(format!("invalid mapping JSON: {error}")))?;
        Self::from_document(&document)
    }

    pub fn from_document(document: &MappingDocument) -> Result<Self> {
        let mut plans: BTreeMap<EntityKind, FieldMappingPlan> = BTreeMap::new();
        for (remote_table, table) in &document.tables {
            let plan = FieldMappingPlan::build(remote_table, table)?;
            if let Some(previous) = plans.get(&plan.entity) {
                return Err(Error::Mapping(format!(
                    "{} is mapped by both {} and {remote_table}",
                    plan.entity, previous.remote_table
                )));
            }
            plans.insert(plan.entity, plan);
        }
        Ok(Self { plans })
    }

    pub fn plan(&self, entity: EntityKind) -> Result<&FieldMappingPlan> {
        self.plans
            .get(&entity)
            .ok_or_else(|| Error::Mapping(format!("no legacy table is mapped to {entity}")))
    }
}

fn required_name(raw: &str, what: &str) -> std::result::Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        Err(format!("{what} must not be empty"))
    } else {
        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn project_document(field_map: &str) -> String {
        format!(
            r#"{{"tables": {{"iSPEC_Projects": {{
                "entity": "projects",
                "pk": {{"legacy": "prj_PRJRecNo", "local": "id"}},
                "modified_ts": "prj_ModificationTS",
                "created_ts": "prj_CreationTS",
                "field_map": {field_map}
            }}}}}}"#
        )
    }

    #[test]
    fn embedded_mapping_covers_every_entity() {
        let mapping = MappingSet::embedded().unwrap();
        for entity in EntityKind::ALL {
            assert!(mapping.plan(entity).is_ok(), "missing plan for {entity}");
        }
        let runs = mapping.plan(EntityKind::ExperimentRuns).unwrap();
        assert_eq!(
            runs.merge_key(),
            vec!["exprun_EXPRecNo", "exprun_EXPRunNo", "exprun_EXPSearchNo"]
        );
    }

    #[test]
    fn plan_binds_pk_and_timestamps_first() {
        let mapping =
            MappingSet::from_json(&project_document(r#"{"prj_ProjectTitle": "title"}"#)).unwrap();
        let plan = mapping.plan(EntityKind::Projects).unwrap();

        assert_eq!(plan.remote_table, "iSPEC_Projects");
        assert_eq!(
            plan.requested_fields(),
            vec![
                "prj_PRJRecNo",
                "prj_ModificationTS",
                "prj_CreationTS",
                "prj_ProjectTitle"
            ]
        );
        assert_eq!(
            plan.required_fields(),
            vec!["prj_PRJRecNo", "prj_ModificationTS"]
        );
        assert_eq!(plan.merge_key(), vec!["prj_PRJRecNo"]);
        assert_eq!(
            plan.binding_for("created_at").map(|b| b.remote.as_str()),
            Some("prj_CreationTS")
        );
    }

    #[test]
    fn unknown_local_column_is_rejected() {
        let error =
            MappingSet::from_json(&project_document(r#"{"prj_Foo": "not_a_column"}"#)).unwrap_err();
        assert!(matches!(error, Error::Mapping(message) if message.contains("not_a_column")));
    }

    #[test]
    fn imported_at_cannot_be_mapped() {
        let error =
            MappingSet::from_json(&project_document(r#"{"prj_Imported": "imported_at"}"#))
                .unwrap_err();
        assert!(matches!(error, Error::Mapping(_)));
    }

    #[test]
    fn conflicting_bindings_are_rejected() {
        let error = MappingSet::from_json(&project_document(
            r#"{"prj_ProjectTitle": "title", "prj_Title2": "title"}"#,
        ))
        .unwrap_err();
        assert!(matches!(error, Error::Mapping(message) if message.contains("title")));
    }

    #[test]
    fn missing_entity_plan_is_an_error() {
        let mapping = MappingSet::from_json(&project_document("{}")).unwrap();
        assert!(matches!(
            mapping.plan(EntityKind::People),
            Err(Error::Mapping(_))
        ));
    }

    #[test]
    fn surrogate_entities_key_on_parent_column() {
        let raw = r#"{"tables": {"iSPEC_ExperimentRuns": {
            "entity": "experiment_runs",
            "pk": {"legacy": "exprun_EXPRecNo", "local": "id"},
            "modified_ts": "exprun_ModificationTS"
        }}}"#;
        assert!(matches!(
            MappingSet::from_json(raw),
            Err(Error::Mapping(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_mapping_error() {
        assert!(matches!(
            MappingSet::from_json("{\"tables\": ["),
            Err(Error::Mapping(_))
        ));
    }
}
