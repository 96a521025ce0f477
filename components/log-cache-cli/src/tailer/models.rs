// Local crates
use crate::parser::models::{Envelope, EnvelopeType, Nanos};

// External crates
use std::time::Duration;

/// Envelopes requested per poll once the engine is following from a known cursor.
pub const FOLLOW_LIMIT: u32 = 1_000;

/// Everything one tail invocation needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOptions {
    pub source_id: String,
    pub follow: bool,
    /// Write the `Retrieving logs for ...` header before any envelope
    pub headers: bool,
    /// Envelopes requested by the first poll
    pub lines: u32,
    /// Lower bound of the first poll, `None` for the most recent window
    pub start_time: Option<Nanos>,
    pub envelope_types: Vec<EnvelopeType>,
    pub poll_interval: Duration,
    /// How far behind the cursor emitted identities are remembered
    pub retention: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            source_id: String::new(),
            follow: false,
            headers: true,
            lines: 10,
            start_time: None,
            envelope_types: Vec::new(),
            poll_interval: Duration::from_millis(250),
            retention: Duration::from_secs(1),
        }
    }
}

/// What one invocation did, returned when the engine reaches `Done`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailSummary {
    pub polls: u64,
    pub emitted: u64,
    /// Follow-mode batches dropped because the response could not be decoded
    pub skipped_batches: u64,
}

/// ```text
/// Init ─► Polling ─► Rendering ─► Done            (one-shot)
///            ▲            │
///            └─ Waiting ◄─┘ ─► Done on cancel     (follow)
/// ```
#[derive(Debug)]
pub(crate) enum EngineState {
    Init,
    Polling,
    Rendering(Vec<Envelope>),
    Waiting,
    Done,
}
