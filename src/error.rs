use thiserror::Error;

use crate::schema::{EntityKind, Semester};

/// Errors raised by the stores, the generators and the synchronizer.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// A store could not be opened. Aborts the whole run.
    #[error("cannot open {store} store at {path}: {source}")]
    Connection {
        store: &'static str,
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A parent row or node required by `entity` is missing.
    #[error(
        "{entity} {} references missing {parent} {parent_id} via {relationship}",
        row_id(.id)
    )]
    ReferentialViolation {
        entity: EntityKind,
        id: Option<i64>,
        parent: EntityKind,
        parent_id: i64,
        relationship: &'static str,
    },

    /// An attendance insert targeted a semester without a partition.
    #[error("no attendance partition exists for semester {0}")]
    PartitionMissing(Semester),

    /// A source row does not have the shape its entity requires.
    #[error("malformed {entity} row {}: {reason}", row_id(.id))]
    MalformedRow {
        entity: EntityKind,
        id: Option<i64>,
        reason: String,
    },

    #[error("referenced schedule {0} not found")]
    ScheduleNotFound(i64),

    #[error("invalid term {name}: {reason}")]
    InvalidTerm { name: String, reason: String },

    #[error("invalid semester label: {0}")]
    InvalidSemester(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl MirrorError {
    pub fn malformed(entity: EntityKind, id: Option<i64>, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            entity,
            id,
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this failure only invalidates a single row.
    pub fn is_row_local(&self) -> bool {
        matches!(self, Self::MalformedRow { .. })
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;

fn row_id(id: &Option<i64>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "(unsaved)".to_string(),
    }
}

/// Returns true when a SQLite error is a foreign key constraint failure.
pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_malformed_rows_are_row_local() {
        let err = MirrorError::malformed(EntityKind::Student, Some(3), "name is empty");
        assert!(err.is_row_local());
        assert_eq!(err.to_string(), "malformed Student row 3: name is empty");

        let err = MirrorError::ReferentialViolation {
            entity: EntityKind::Institute,
            id: Some(1),
            parent: EntityKind::University,
            parent_id: 1,
            relationship: "HAS_INSTITUTE",
        };
        assert!(!err.is_row_local());
        assert_eq!(
            err.to_string(),
            "Institute 1 references missing University 1 via HAS_INSTITUTE"
        );
    }

    #[test]
    fn schedule_not_found_message() {
        assert_eq!(
            MirrorError::ScheduleNotFound(42).to_string(),
            "referenced schedule 42 not found"
        );
    }
}
