//! Audit and soft-delete stamps shared by all persisted entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Creation/update/soft-delete bookkeeping carried by every persisted row.
///
/// Soft delete marks a row inactive via `is_deleted`/`deleted_at`; rows are
/// never physically removed while anything may still reference them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<UserId>,
}

impl AuditStamp {
    pub fn created(at: DateTime<Utc>, by: Option<UserId>) -> Self {
        Self {
            created_at: at,
            created_by: by,
            updated_at: None,
            updated_by: None,
            is_deleted: false,
            deleted_at: None,
            deleted_by: None,
        }
    }

    /// Record an update. Does not touch deletion state.
    pub fn touch(&mut self, at: DateTime<Utc>, by: Option<UserId>) {
        self.updated_at = Some(at);
        self.updated_by = by;
    }

    /// Mark soft-deleted. Idempotent: a second call keeps the original stamp.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>, by: Option<UserId>) {
        if self.is_deleted {
            return;
        }
        self.is_deleted = true;
        self.deleted_at = Some(at);
        self.deleted_by = by;
    }
}
