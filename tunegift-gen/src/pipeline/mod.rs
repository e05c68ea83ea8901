//! Pipeline stages
//!
//! Order to finished song: orchestrator creates the Job, the lyrics stage
//! produces and gates the text, dispatch hands it to the music provider, and
//! reconciliation (fed by webhook or poll, identically) persists the rendered
//! variants. Stem separation is an optional sub-pipeline per song.

pub mod dispatch;
pub mod lyrics_stage;
pub mod orchestrator;
pub mod poll;
pub mod reconcile;
pub mod stems;

pub use dispatch::AUDIO_RETRY_CEILING;
pub use poll::SweepSummary;
pub use reconcile::{ReconcileOutcome, VARIANTS_PER_JOB};
