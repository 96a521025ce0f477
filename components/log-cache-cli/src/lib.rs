//! Log Cache CLI
//!
//! Retrieves time-ordered envelopes for a source from a Log Cache endpoint and renders
//! them as text lines, optionally following the source as new envelopes arrive.
//!
//! ```text
//! TailEngine ──► LogCacheClient ──► parser (decode)
//!     │                                   │
//!     │◄──────────── Vec<Envelope> ◄──────┘
//!     ▼
//!   Cursor (sort + dedup + advance) ──► Renderer ──► sink
//! ```

pub mod cli;
pub mod client;
pub mod cursor;
pub mod helpers;
pub mod instrumentation;
pub mod meta;
pub mod parser;
pub mod renderer;
pub mod runtime;
pub mod tailer;
