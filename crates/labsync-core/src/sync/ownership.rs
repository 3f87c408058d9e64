//! Who owns a local row: the sync engine or a person.

use chrono::{NaiveDateTime, TimeDelta};

use crate::db::ExistingRow;
use crate::models::SYNC_MARKER;

/// Edits this close to creation are treated as part of the import itself.
const CREATION_GRACE_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Still exactly what the sync engine wrote; safe to overwrite
    SyncOwned,
    /// Touched locally since the last import
    UserOwned,
}

/// Provenance columns of a local row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnershipFacts<'a> {
    pub added_by: Option<&'a str>,
    pub created_at: Option<NaiveDateTime>,
    pub modified_at: Option<NaiveDateTime>,
    pub imported_at: Option<NaiveDateTime>,
}

impl<'a> OwnershipFacts<'a> {
    pub fn from_row(row: &'a ExistingRow) -> Self {
        Self {
            added_by: row.text("added_by"),
            created_at: row.timestamp("created_at"),
            modified_at: row.timestamp("modified_at"),
            imported_at: row.timestamp("imported_at"),
        }
    }
}

/// Decide whether an incoming record may overwrite the row.
pub fn classify_ownership(facts: &OwnershipFacts<'_>) -> Ownership {
    let Some(imported_at) = facts.imported_at else {
        if facts.added_by != Some(SYNC_MARKER) {
            return Ownership::UserOwned;
        }
        return match (facts.created_at, facts.modified_at) {
            (Some(created_at), Some(modified_at))
                if modified_at > created_at + TimeDelta::seconds(CREATION_GRACE_SECS) =>
            {
                Ownership::UserOwned
            }
            _ => Ownership::SyncOwned,
        };
    };

    match facts.modified_at {
        Some(modified_at) if modified_at > imported_at => Ownership::UserOwned,
        _ => Ownership::SyncOwned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32, second: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(hour, minute, second)
    }

    #[test]
    fn unimported_rows_need_the_marker() {
        let facts = OwnershipFacts {
            added_by: Some("alice"),
            ..OwnershipFacts::default()
        };
        assert_eq!(classify_ownership(&facts), Ownership::UserOwned);

        let placeholder = OwnershipFacts {
            added_by: Some(SYNC_MARKER),
            created_at: at(10, 0, 0),
            modified_at: at(10, 0, 0),
            imported_at: None,
        };
        assert_eq!(classify_ownership(&placeholder), Ownership::SyncOwned);
    }

    #[test]
    fn unimported_rows_allow_creation_grace() {
        let mut facts = OwnershipFacts {
            added_by: Some(SYNC_MARKER),
            created_at: at(10, 0, 0),
            modified_at: at(10, 0, 5),
            imported_at: None,
        };
        assert_eq!(classify_ownership(&facts), Ownership::SyncOwned);

        facts.modified_at = at(10, 0, 6);
        assert_eq!(classify_ownership(&facts), Ownership::UserOwned);

        facts.created_at = None;
        assert_eq!(classify_ownership(&facts), Ownership::SyncOwned);
    }

    #[test]
    fn imported_rows_compare_against_import_time() {
        let mut facts = OwnershipFacts {
            added_by: Some("alice"),
            created_at: at(9, 0, 0),
            modified_at: at(10, 0, 0),
            imported_at: at(10, 0, 0),
        };
        assert_eq!(classify_ownership(&facts), Ownership::SyncOwned);

        facts.modified_at = at(10, 0, 1);
        assert_eq!(classify_ownership(&facts), Ownership::UserOwned);

        facts.modified_at = None;
        assert_eq!(classify_ownership(&facts), Ownership::SyncOwned);
    }
}
