//! Line framing for streamed HTTP bodies.
//!
//! Network chunks do not respect line boundaries, so bytes are buffered until
//! a newline arrives. Both NDJSON (Ollama) and SSE (Claude) are line-based.

use futures::{Stream, StreamExt};
use ragloop_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::pin::Pin;

pub(crate) type LineStream = Pin<Box<dyn Stream<Item = AppResult<String>> + Send>>;

struct LineState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

/// Split a byte stream into trimmed, non-empty lines.
pub(crate) fn into_lines<S, B, E>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = LineState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                        push_line(&mut state.ready, &raw);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(AppError::Llm(format!("Stream error: {}", e))), state));
                }
                None => {
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    push_line(&mut state.ready, &rest);
                }
            }
        }
    }))
}

fn push_line(ready: &mut VecDeque<String>, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw).trim().to_string();
    if !line.is_empty() {
        ready.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_across_chunk_boundaries() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"{\"a\":".to_vec()),
            Ok(b"1}\n\n{\"b\"".to_vec()),
            Ok(b":2}".to_vec()),
        ];
        let lines: Vec<String> = into_lines(futures::stream::iter(chunks))
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn test_stream_error_ends_lines() {
        let chunks: Vec<Result<Vec<u8>, String>> =
            vec![Ok(b"one\n".to_vec()), Err("reset".to_string()), Ok(b"two\n".to_vec())];
        let items: Vec<AppResult<String>> =
            into_lines(futures::stream::iter(chunks)).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "one");
        assert!(items[1].is_err());
    }
}
