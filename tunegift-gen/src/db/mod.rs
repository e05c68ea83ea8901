//! Database access for tunegift-gen
//!
//! One module per table. All cross-stage communication flows through these
//! rows; mutations racing between the webhook and polling paths are
//! expressed as natural-key upserts, never lock-based mutual exclusion.

pub mod approvals;
pub mod credits;
pub mod generations;
pub mod jobs;
pub mod orders;
pub mod songs;
pub mod stems;

use tunegift_common::{Error, Result};
use uuid::Uuid;

/// Parse a TEXT uuid column, naming the field on failure
pub(crate) fn parse_uuid(s: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Internal(format!("invalid uuid in {}: {}", field, e)))
}
