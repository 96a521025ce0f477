//! Tail engine: drives polls against an [`EnvelopeSource`], feeds every batch through the
//! [`Cursor`] and writes the rendered net-new envelopes to the sink.
//!
//! Cancellation is observed while a request is in flight and while waiting between
//! polls. Output already written is never lost: lines are flushed batch by batch.

// Local crates
use crate::client::client::{EnvelopeSource, ReadRequest};
use crate::client::error::ClientError;
use crate::cursor::cursor::Cursor;
use crate::parser::models::Envelope;
use crate::renderer::renderer::Renderer;
use crate::tailer::{
    error::TailError,
    models::{EngineState, FOLLOW_LIMIT, TailOptions, TailSummary},
};

// External crates
use chrono::{Local, TimeZone};
use std::fmt::Display;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug)]
pub struct TailEngine<S, W, Tz: TimeZone = Local> {
    source: S,
    sink: W,
    renderer: Renderer<Tz>,
    cursor: Cursor,
    options: TailOptions,
    cancel: CancellationToken,
    /// Set after the first successful poll; later polls walk forward from the cursor
    primed: bool,
    summary: TailSummary,
}

impl<S, W> TailEngine<S, W, Local>
where
    S: EnvelopeSource,
    W: AsyncWrite + Unpin,
{
    /// Engine rendering timestamps in the local time zone.
    pub fn new(source: S, sink: W, options: TailOptions, cancel: CancellationToken) -> Self {
        Self::with_renderer(source, sink, options, cancel, Renderer::local())
    }
}

impl<S, W, Tz> TailEngine<S, W, Tz>
where
    S: EnvelopeSource,
    W: AsyncWrite + Unpin,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn with_renderer(
        source: S,
        sink: W,
        options: TailOptions,
        cancel: CancellationToken,
        renderer: Renderer<Tz>,
    ) -> Self {
        Self {
            source,
            sink,
            renderer,
            cursor: Cursor::new(options.start_time, options.retention),
            options,
            cancel,
            primed: false,
            summary: TailSummary::default(),
        }
    }

    /// Run until one-shot completion, cancellation or a fatal error.
    #[instrument(
        name = "tail_engine::run",
        target = "tailer::tailer::TailEngine",
        skip_all,
        fields(source_id = %self.options.source_id, follow = self.options.follow),
        level = "debug"
    )]
    pub async fn run(&mut self) -> Result<TailSummary, TailError> {
        let mut state = EngineState::Init;

        loop {
            state = match state {
                EngineState::Init => {
                    self.validate()?;
                    if self.options.headers {
                        let header = format!("Retrieving logs for {}...\n\n", self.options.source_id);
                        self.write(header.as_bytes()).await?;
                    }
                    EngineState::Polling
                }
                EngineState::Polling => self.poll().await?,
                EngineState::Rendering(batch) => {
                    self.emit(batch).await?;
                    if self.options.follow {
                        EngineState::Waiting
                    } else {
                        EngineState::Done
                    }
                }
                EngineState::Waiting => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => EngineState::Done,
                        _ = tokio::time::sleep(self.options.poll_interval) => EngineState::Polling,
                    }
                }
                EngineState::Done => break,
            };
        }

        tracing::debug!(
            polls = self.summary.polls,
            emitted = self.summary.emitted,
            skipped_batches = self.summary.skipped_batches,
            "Tail finished"
        );
        Ok(self.summary)
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    fn validate(&self) -> Result<(), TailError> {
        if self.options.source_id.trim().is_empty() {
            return Err(TailError::InvalidArguments(
                "exactly one non-empty source id is required".to_string(),
            ));
        }
        if self.options.lines == 0 {
            return Err(TailError::InvalidArguments(
                "number of lines must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn next_request(&self) -> ReadRequest {
        let start_time = self.cursor.next_start();
        // Without a position, ask for the newest `lines` envelopes.
        let (limit, descending) = match (start_time, self.primed) {
            (None, _) => (self.options.lines, true),
            (Some(_), false) => (self.options.lines, false),
            (Some(_), true) => (FOLLOW_LIMIT, false),
        };

        ReadRequest {
            source_id: self.options.source_id.clone(),
            start_time,
            end_time: None,
            limit: Some(limit),
            descending,
            envelope_types: self.options.envelope_types.clone(),
        }
    }

    async fn poll(&mut self) -> Result<EngineState, TailError> {
        if self.cancel.is_cancelled() {
            return Ok(EngineState::Done);
        }

        let request = self.next_request();
        self.summary.polls += 1;

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.source.poll(&request) => Some(result),
        };

        match outcome {
            None => Ok(EngineState::Done),
            Some(Ok(batch)) => {
                self.primed = true;
                Ok(EngineState::Rendering(batch))
            }
            Some(Err(err)) => self.recover(err),
        }
    }

    /// Follow mode survives transport trouble and undecodable batches; everything else
    /// ends the invocation.
    fn recover(&mut self, err: ClientError) -> Result<EngineState, TailError> {
        if !self.options.follow {
            return Err(err.into());
        }

        if err.is_transient() {
            tracing::warn!(error = %err, "Poll failed, retrying after the poll interval");
            return Ok(EngineState::Waiting);
        }

        if err.is_malformed() {
            self.summary.skipped_batches += 1;
            tracing::warn!(error = %err, "Skipping batch that could not be decoded");
            return Ok(EngineState::Waiting);
        }

        Err(err.into())
    }

    async fn emit(&mut self, batch: Vec<Envelope>) -> Result<(), TailError> {
        let fresh = self.cursor.advance(batch);
        if fresh.is_empty() {
            return Ok(());
        }

        let mut out = String::new();
        for envelope in &fresh {
            out.push_str(&self.renderer.render(envelope));
            out.push('\n');
        }
        self.write(out.as_bytes()).await?;

        self.summary.emitted += fresh.len() as u64;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), TailError> {
        self.sink.write_all(bytes).await.map_err(TailError::SinkWrite)?;
        self.sink.flush().await.map_err(TailError::SinkWrite)
    }
}
