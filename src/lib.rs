#![deny(clippy::all)]

//! Core of a transcript annotation editor: a tiled segment timeline, a playback
//! gate that forces speaker assignment, a section and tag hierarchy over the
//! transcript blocks, and the bridge to the transcript backend and local drafts.

pub mod config;
pub mod error;
pub mod gate;
mod ids;
pub mod notice;
pub mod persistence;
pub mod segments;
pub mod session;
pub mod speakers;
pub mod sync;
pub mod tags;

pub use config::Config;
pub use error::{ApiError, AppError, DraftError, ValidationError};
pub use session::{spawn_gate_ticker, EditorSession, LoadSource, LoadSummary};
