//! Streamed-response assembly.
//!
//! Folds the chunked byte stream of a synthesis response into one
//! contiguous buffer. Bounded to a fixed number of read iterations so a
//! malformed or unterminated stream cannot wedge the pipeline; the reader
//! is released on every path by drop.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::NarrateError;

/// Upper bound on stream read iterations before the response is declared
/// malformed.
pub const MAX_STREAM_ITERATIONS: usize = 1000;

/// Read `stream` to completion and concatenate its non-empty chunks.
///
/// Fails with [`NarrateError::Stream`] when the iteration bound is hit
/// while the stream is still producing, when a read errors, or when the
/// finished buffer is empty.
pub async fn assemble<S, E>(mut stream: S) -> Result<Vec<u8>, NarrateError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut buffer = Vec::new();

    for iteration in 0..MAX_STREAM_ITERATIONS {
        match stream.next().await {
            Some(Ok(chunk)) => {
                if !chunk.is_empty() {
                    buffer.extend_from_slice(&chunk);
                }
            }
            Some(Err(e)) => {
                tracing::warn!(iteration, error = %e, "Audio stream read failed");
                return Err(NarrateError::Stream(format!("read failed: {e}")));
            }
            None => {
                if buffer.is_empty() {
                    tracing::warn!("Audio stream completed with an empty payload");
                    return Err(NarrateError::Stream("empty audio payload".to_string()));
                }
                return Ok(buffer);
            }
        }
    }

    tracing::warn!(
        limit = MAX_STREAM_ITERATIONS,
        bytes = buffer.len(),
        "Audio stream exceeded read iteration bound — discarding"
    );
    Err(NarrateError::Stream(format!(
        "unterminated stream after {MAX_STREAM_ITERATIONS} reads"
    )))
}
