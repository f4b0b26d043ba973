//! SSE plumbing for streaming backend responses.
//!
//! The wire pattern is always the same: buffer body chunks, split on
//! `\n\n`, pull out `data:` payloads, and hand each payload to a parser
//! that may or may not produce a [`StreamEvent`].

use crate::util::from_reqwest;
use sg_domain::error::Result;
use sg_domain::stream::{BoxStream, StreamEvent};

/// Pull complete `data:` payloads out of an SSE buffer.
///
/// Events are delimited by `\n\n`; within a block only `data:` lines
/// matter. Consumed bytes are drained from the buffer, leaving any
/// trailing partial event for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
    }

    payloads
}

/// Turn an SSE `reqwest::Response` into a [`BoxStream`] of events.
///
/// `parse_data` receives each `data:` payload and returns at most one
/// event ([`None`] for payloads that carry nothing we care about, e.g.
/// the `[DONE]` sentinel). The stream flushes any trailing partial event
/// when the body closes, and guarantees a final `Done` even if the
/// parser never produced one.
pub(crate) fn response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Option<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut done_emitted = false;

        loop {
            let chunk = match response.chunk().await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));
            for payload in drain_data_lines(&mut buffer) {
                if let Some(event) = parse_data(&payload) {
                    done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
        }

        // Body closed: flush a trailing event that never got its \n\n.
        if !buffer.trim().is_empty() {
            buffer.push_str("\n\n");
            for payload in drain_data_lines(&mut buffer) {
                if let Some(event) = parse_data(&payload) {
                    done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
