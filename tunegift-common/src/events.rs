//! Pipeline event types and broadcast bus
//!
//! Reconciliation and the stages emit events; side-effect consumers (the
//! customer notifier) subscribe. Emission never blocks and never fails the
//! emitter, which keeps reconciliation's outcome decoupled from notification
//! delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A job was created for a paid order
    JobCreated {
        job_id: Uuid,
        order_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Lyrics stage finished; approval created
    LyricsGenerated {
        job_id: Uuid,
        order_id: Uuid,
        auto_approved: bool,
        timestamp: DateTime<Utc>,
    },

    /// Lyrics stage failed; placeholder persisted, approval left pending
    LyricsFailed {
        job_id: Uuid,
        order_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Job submitted to the music-generation provider
    AudioDispatched {
        job_id: Uuid,
        order_id: Uuid,
        task_id: String,
        timestamp: DateTime<Utc>,
    },

    /// One song variant reached ready state
    SongReady {
        order_id: Uuid,
        song_id: Uuid,
        variant: i64,
        timestamp: DateTime<Utc>,
    },

    /// All variants reconciled; job completed
    JobCompleted {
        job_id: Uuid,
        order_id: Uuid,
        songs: usize,
        timestamp: DateTime<Utc>,
    },

    /// Job failed permanently (retry ceiling reached or lyrics stage fatal)
    JobFailed {
        job_id: Uuid,
        order_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Stem separation completed for a song
    StemsSeparated {
        song_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Event type name for logging and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::JobCreated { .. } => "JobCreated",
            PipelineEvent::LyricsGenerated { .. } => "LyricsGenerated",
            PipelineEvent::LyricsFailed { .. } => "LyricsFailed",
            PipelineEvent::AudioDispatched { .. } => "AudioDispatched",
            PipelineEvent::SongReady { .. } => "SongReady",
            PipelineEvent::JobCompleted { .. } => "JobCompleted",
            PipelineEvent::JobFailed { .. } => "JobFailed",
            PipelineEvent::StemsSeparated { .. } => "StemsSeparated",
        }
    }
}

/// Broadcast bus for pipeline events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. A send error only means no subscribers are listening.
    pub fn emit(&self, event: PipelineEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event_type, receivers, "Pipeline event emitted");
            }
            Err(_) => {
                tracing::debug!(event_type, "Pipeline event dropped (no subscribers)");
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
