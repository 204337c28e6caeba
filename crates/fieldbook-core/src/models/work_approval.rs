//! Work approval request model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::impl_record;
use super::{Collection, RecordId};

/// Review state of a work approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a stored status; unknown values from newer servers yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request by a user to have work on a given date approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkApproval {
    pub id: RecordId,
    pub user_id: Option<String>,
    pub date: String,
    pub reason: String,
    pub description: String,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Default for WorkApproval {
    fn default() -> Self {
        Self {
            id: RecordId::default(),
            user_id: None,
            date: String::new(),
            reason: String::new(),
            description: String::new(),
            status: ApprovalStatus::Pending.to_string(),
            created_at: 0,
            updated_at: 0,
        }
    }
}

impl_record!(WorkApproval, Collection::WorkApprovals);

impl WorkApproval {
    #[must_use]
    pub fn approval_status(&self) -> Option<ApprovalStatus> {
        ApprovalStatus::parse(&self.status)
    }
}
