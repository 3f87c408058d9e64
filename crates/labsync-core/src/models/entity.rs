//! Local entity catalogue
//!
//! Every synchronized entity is described by a static column list. The field
//! mapper validates mapping documents against it and the upsert engine uses it
//! to read and write rows without a per-entity struct.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Provenance marker stamped on rows the sync engine created.
pub const SYNC_MARKER: &str = "legacy_import";

/// Author of comments that carry no person reference.
pub const SYSTEM_PERSON_ID: i64 = 0;

/// Storage class of a local column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

/// One column of a local entity table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn col(name: &'static str, kind: ColumnKind, nullable: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable,
    }
}

use ColumnKind::{Boolean, Float, Integer, Text, Timestamp};

const PROJECT_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false),
    col("added_by", Text, false),
    col("title", Text, false),
    col("description", Text, true),
    col("project_type", Text, true),
    col("display_id", Text, true),
    col("display_title", Text, true),
    col("status", Text, true),
    col("pi", Text, true),
    col("lab_contact", Text, true),
    col("lab_personnel", Text, true),
    col("core_leader", Text, true),
    col("services_type", Text, true),
    col("services", Text, true),
    col("grant_support", Text, true),
    col("background", Text, true),
    col("samples", Text, true),
    col("sample_type", Text, true),
    col("comments_general", Text, true),
    col("r_and_d", Boolean, false),
    col("current_flag", Boolean, false),
    col("billing_ready", Boolean, false),
    col("payment_received", Boolean, false),
    col("exp_count", Integer, false),
    col("exp_run_count", Integer, false),
    col("ms_files_count", Integer, false),
    col("ms_run_time", Float, false),
    col("cost_minimum", Float, false),
    col("cost_maximum", Float, true),
    col("paid_price", Float, true),
    col("date_submitted", Timestamp, true),
    col("date_closed", Timestamp, true),
    col("invoice_date", Timestamp, true),
    col("created_at", Timestamp, false),
    col("modified_at", Timestamp, false),
    col("imported_at", Timestamp, true),
];

const PERSON_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false),
    col("added_by", Text, false),
    col("first_name", Text, false),
    col("last_name", Text, false),
    col("domain", Text, true),
    col("email", Text, true),
    col("phone", Text, true),
    col("pi", Text, true),
    col("institution", Text, true),
    col("center", Text, true),
    col("department", Text, true),
    col("status", Text, true),
    col("roles", Text, true),
    col("created_at", Timestamp, false),
    col("modified_at", Timestamp, false),
    col("imported_at", Timestamp, true),
];

const EXPERIMENT_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false),
    col("project_id", Integer, true),
    col("record_no", Text, false),
    col("added_by", Text, false),
    col("name", Text, true),
    col("exp_type", Text, true),
    col("label_flag", Integer, true),
    col("lysis", Text, true),
    col("dtt", Boolean, true),
    col("iaa", Boolean, true),
    col("description", Text, true),
    col("created_at", Timestamp, false),
    col("modified_at", Timestamp, false),
    col("imported_at", Timestamp, true),
];

const EXPERIMENT_RUN_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false),
    col("experiment_id", Integer, false),
    col("run_no", Integer, false),
    col("search_no", Integer, false),
    col("added_by", Text, false),
    col("db_search_flag", Boolean, false),
    col("gpgrouper_flag", Boolean, false),
    col("created_at", Timestamp, false),
    col("modified_at", Timestamp, false),
    col("imported_at", Timestamp, true),
];

const PROJECT_COMMENT_COLUMNS: &[ColumnSpec] = &[
    col("id", Integer, false),
    col("project_id", Integer, false),
    col("person_id", Integer, false),
    col("added_by", Text, false),
    col("comment_type", Text, true),
    col("comment", Text, true),
    col("created_at", Timestamp, false),
    col("modified_at", Timestamp, false),
    col("imported_at", Timestamp, true),
];

/// A synchronized entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Projects,
    People,
    Experiments,
    ExperimentRuns,
    ProjectComments,
}

impl EntityKind {
    /// Every entity, parents before children.
    pub const ALL: [Self; 5] = [
        Self::Projects,
        Self::People,
        Self::Experiments,
        Self::ExperimentRuns,
        Self::ProjectComments,
    ];

    /// Name used in mapping documents and on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Projects => "projects",
            Self::People => "people",
            Self::Experiments => "experiments",
            Self::ExperimentRuns => "experiment_runs",
            Self::ProjectComments => "project_comments",
        }
    }

    /// Local table name.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Projects => "project",
            Self::People => "person",
            Self::Experiments => "experiment",
            Self::ExperimentRuns => "experiment_run",
            Self::ProjectComments => "project_comment",
        }
    }

    pub const fn columns(self) -> &'static [ColumnSpec] {
        match self {
            Self::Projects => PROJECT_COLUMNS,
            Self::People => PERSON_COLUMNS,
            Self::Experiments => EXPERIMENT_COLUMNS,
            Self::ExperimentRuns => EXPERIMENT_RUN_COLUMNS,
            Self::ProjectComments => PROJECT_COMMENT_COLUMNS,
        }
    }

    pub fn column(self, name: &str) -> Option<&'static ColumnSpec> {
        self.columns().iter().find(|column| column.name == name)
    }

    /// Columns that identify a local row for this entity.
    ///
    /// Entities with a surrogate local id are matched on a natural key
    /// instead of the remote primary key.
    pub const fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::Projects | Self::People | Self::Experiments => &["id"],
            Self::ExperimentRuns => &["experiment_id", "run_no", "search_no"],
            Self::ProjectComments => &["project_id", "person_id", "created_at"],
        }
    }

    /// Whether the local `id` is assigned by `SQLite` rather than mirrored
    /// from the legacy primary key.
    pub const fn has_surrogate_id(self) -> bool {
        matches!(self, Self::ExperimentRuns | Self::ProjectComments)
    }

    /// Parent references as `(local column, parent entity)`.
    pub const fn parents(self) -> &'static [(&'static str, Self)] {
        match self {
            Self::Projects | Self::People => &[],
            Self::Experiments => &[("project_id", Self::Projects)],
            Self::ExperimentRuns => &[("experiment_id", Self::Experiments)],
            Self::ProjectComments => &[
                ("project_id", Self::Projects),
                ("person_id", Self::People),
            ],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "projects" | "project" => Ok(Self::Projects),
            "people" | "person" => Ok(Self::People),
            "experiments" | "experiment" => Ok(Self::Experiments),
            "experiment_runs" | "experiment_run" | "runs" => Ok(Self::ExperimentRuns),
            "project_comments" | "project_comment" | "comments" => Ok(Self::ProjectComments),
            other => Err(format!("unknown entity '{other}'")),
        }
    }
}
