//! External provider clients and pure helpers
//!
//! Every provider's raw response shape is confined to its client module;
//! pipeline logic only ever sees the typed structs defined here.

pub mod audio_validator;
pub mod lyrics_client;
pub mod lyrics_parser;
pub mod music_client;
pub mod notifier;
pub mod stem_client;
pub mod storage;

pub use audio_validator::{ArtifactFetcher, HttpArtifactFetcher, IntegrityError, ValidatedArtifact};
pub use lyrics_client::{GeneratedLyrics, LyricsClient, LyricsProvider, SongBrief};
pub use music_client::{GenerationRequest, MusicClient, MusicProvider, TaskPhase, TaskStatus};
pub use stem_client::{StemClient, StemProvider};
pub use storage::{ArtifactStore, StorageClient};
