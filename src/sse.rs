//! Server-Sent Events (SSE) processing for reply streams.
//!
//! The backend pushes one JSON object per event, either `{"text": ...}` or
//! `{"error": ...}`, and ends the reply by closing the connection.  This
//! module turns the raw response bytes into a stream of [`Delta`]s.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::{Delta, DeltaPayload, Error, Result};

/// Process a stream of bytes into a stream of deltas.
///
/// Chunk boundaries may fall anywhere, including inside a UTF-8 sequence.
/// Events without a `data` field (keep-alives, comments) are skipped.
///
/// ```
/// # tokio_test::block_on(async {
/// use bytes::Bytes;
/// use futures::{StreamExt, stream};
/// use roomchat::Delta;
/// use roomchat::sse::process_sse;
///
/// let bytes = stream::iter(vec![
///     Ok::<_, roomchat::Error>(Bytes::from_static(b"data: {\"text\": \"Hel")),
///     Ok(Bytes::from_static(b"lo\"}\n\n")),
/// ]);
/// let deltas: Vec<_> = process_sse(bytes).collect().await;
/// assert_eq!(deltas[0].as_ref().unwrap(), &Delta::Text("Hello".to_string()));
/// # });
/// ```
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<Delta>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (byte_stream, buffer, false),
        move |(mut stream, mut buffer, mut done)| async move {
            loop {
                // First drain complete events already buffered
                while let Some(event) = extract_event(&mut buffer) {
                    if let Some(delta) = parse_event(&event) {
                        return Some((delta, (stream, buffer, done)));
                    }
                }
                if done {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, done)));
                    }
                    None => {
                        // A final event may lack its trailing blank line
                        done = true;
                        if !buffer.is_empty() {
                            let event = std::mem::take(&mut buffer);
                            if let Some(delta) = parse_event(&event) {
                                return Some((delta, (stream, buffer, done)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Remove one complete event (terminated by a blank line) from the buffer.
fn extract_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let mut start = 0;
    while let Some(pos) = buffer[start..].iter().position(|b| *b == b'\n') {
        let newline = start + pos;
        let rest = &buffer[newline + 1..];
        let end = if rest.first() == Some(&b'\n') {
            newline + 2
        } else if rest.starts_with(b"\r\n") {
            newline + 3
        } else {
            start = newline + 1;
            continue;
        };
        return Some(buffer.drain(..end).collect());
    }
    None
}

/// Parse one event block.  Returns `None` for events that carry no data.
fn parse_event(event: &[u8]) -> Option<Result<Delta>> {
    let text = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => {
            return Some(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut data: Option<String> = None;
    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            match data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
    }

    let data = data?;
    match serde_json::from_str::<DeltaPayload>(&data) {
        Ok(payload) => Some(Ok(payload.into())),
        Err(e) => Some(Err(Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        ))),
    }
}
