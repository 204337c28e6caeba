//! Data models for Fieldbook

mod customer_b2b;
mod customer_b2c;
mod record;
mod sync_conflict;
mod user;
mod work_approval;

pub use customer_b2b::CustomerB2B;
pub use customer_b2c::CustomerB2C;
pub use record::{Collection, Record, RecordId};
pub use sync_conflict::{ConflictWinner, SyncConflict};
pub use user::User;
pub use work_approval::{ApprovalStatus, WorkApproval};
