//! Database models and status enums
//!
//! All pipeline state lives in these rows; the webhook and polling paths
//! communicate exclusively through them, never through in-memory queues.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order status, owned by the checkout/payment collaborators.
/// The pipeline only ever reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "failed" => Some(OrderStatus::Failed),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan tier, affects the release SLA applied to generated songs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Standard,
    Express,
}

impl PlanTier {
    /// Hours between reconciliation and the scheduled song release
    pub fn release_delay_hours(&self) -> i64 {
        match self {
            PlanTier::Standard => 48,
            PlanTier::Express => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Standard => "standard",
            PlanTier::Express => "express",
        }
    }

    /// Unknown tiers fall back to standard rather than failing the order
    pub fn parse(s: &str) -> Self {
        match s {
            "express" => PlanTier::Express,
            _ => PlanTier::Standard,
        }
    }
}

/// Job lifecycle status
///
/// `pending → processing → completed | failed`, with `retry_pending`
/// re-entering dispatch after a bounded number of automatic retries and
/// `audio_processing` marking that audio dispatch is the active stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RetryPending,
    AudioProcessing,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::RetryPending => "retry_pending",
            JobStatus::AudioProcessing => "audio_processing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "retry_pending" => Some(JobStatus::RetryPending),
            "audio_processing" => Some(JobStatus::AudioProcessing),
            _ => None,
        }
    }

    /// Terminal states accept no further automatic transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lyrics approval status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Song status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SongStatus {
    Pending,
    Ready,
}

impl SongStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongStatus::Pending => "pending",
            SongStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SongStatus::Pending),
            "ready" => Some(SongStatus::Ready),
            _ => None,
        }
    }
}

/// Stem separation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SeparationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeparationStatus::Pending => "pending",
            SeparationStatus::Processing => "processing",
            SeparationStatus::Completed => "completed",
            SeparationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SeparationStatus::Pending),
            "processing" => Some(SeparationStatus::Processing),
            "completed" => Some(SeparationStatus::Completed),
            "failed" => Some(SeparationStatus::Failed),
            _ => None,
        }
    }
}

/// A paid purchase, created by the checkout collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub plan: PlanTier,
    pub status: OrderStatus,
    pub quiz_id: Uuid,
}

/// The customer's creative brief, immutable once the order is paid
/// except for the `answers` map (may carry a pre-approved lyrics override)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub recipient: Option<String>,
    pub relationship: Option<String>,
    pub occasion: Option<String>,
    pub style: Option<String>,
    pub message: Option<String>,
    pub voice_type: Option<String>,
    pub language: Option<String>,
    pub answers: serde_json::Value,
}

/// One unit of pipeline work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub order_id: Uuid,
    pub quiz_id: Uuid,
    pub status: JobStatus,
    pub title: Option<String>,
    pub lyrics: Option<String>,
    pub external_task_id: Option<String>,
    pub retry_count: i64,
    pub audio_url: Option<String>,
    pub error: Option<String>,
}

/// Review checkpoint gating audio generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsApproval {
    pub id: Uuid,
    pub order_id: Uuid,
    pub job_id: Uuid,
    pub lyrics: String,
    pub status: ApprovalStatus,
    pub expires_at: String,
}

/// One rendered audio variant; unique per (order_id, variant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: Uuid,
    pub order_id: Uuid,
    pub variant: i64,
    pub audio_url: Option<String>,
    pub cover_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub clip_id: Option<String>,
    pub status: SongStatus,
    pub release_at: Option<String>,
    pub vocals_url: Option<String>,
    pub instrumental_url: Option<String>,
    pub stems_separated_at: Option<String>,
}

/// Audit record linking an external (task_id, clip_id) pair to its Song
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioGeneration {
    pub id: Uuid,
    pub task_id: String,
    pub clip_id: String,
    pub song_id: Uuid,
    pub order_id: Uuid,
    pub status: String,
}

/// One stem separation request for one Song
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StemSeparation {
    pub id: Uuid,
    pub song_id: Uuid,
    pub task_id: Option<String>,
    pub audio_id: Option<String>,
    pub status: SeparationStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::RetryPending,
            JobStatus::AudioProcessing,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::RetryPending.is_terminal());
        assert!(!JobStatus::AudioProcessing.is_terminal());
    }

    #[test]
    fn test_plan_tier_release_delay() {
        assert_eq!(PlanTier::parse("express").release_delay_hours(), 6);
        assert_eq!(PlanTier::parse("standard").release_delay_hours(), 48);
        // Unknown tiers degrade to standard
        assert_eq!(PlanTier::parse("platinum"), PlanTier::Standard);
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&JobStatus::AudioProcessing).unwrap();
        assert_eq!(json, "\"audio_processing\"");
        let json = serde_json::to_string(&ApprovalStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
