//! Line-oriented decoding of streamed HTTP bodies into text increments.

use futures::stream::{self, BoxStream, StreamExt};

use crate::ports::TextStream;
use crate::{Error, Result};

pub(crate) type ByteStream = BoxStream<'static, reqwest::Result<bytes::Bytes>>;

/// Parses one raw line. `Ok(None)` skips the line.
pub(crate) type LineParser = fn(&[u8]) -> Result<Option<String>>;

struct LineState {
    bytes: ByteStream,
    buffer: Vec<u8>,
    finished: bool,
    parse: LineParser,
    provider: &'static str,
}

impl LineState {
    fn stop(&mut self) {
        self.buffer.clear();
        self.finished = true;
    }
}

/// Split `bytes` on `\n` and run every line through `parse`, in arrival
/// order. A trailing line without a newline is parsed at end of body. The
/// first error ends the stream.
pub(crate) fn line_text_stream(
    bytes: ByteStream,
    provider: &'static str,
    parse: LineParser,
) -> TextStream {
    let state = LineState {
        bytes,
        buffer: Vec::new(),
        finished: false,
        parse,
        provider,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                match (state.parse)(&line) {
                    Ok(Some(piece)) => return Some((Ok(piece), state)),
                    Ok(None) => continue,
                    Err(err) => {
                        state.stop();
                        return Some((Err(err), state));
                    }
                }
            }

            if state.finished {
                if state.buffer.is_empty() {
                    return None;
                }
                let line = std::mem::take(&mut state.buffer);
                return match (state.parse)(&line) {
                    Ok(Some(piece)) => Some((Ok(piece), state)),
                    Ok(None) => None,
                    Err(err) => Some((Err(err), state)),
                };
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    let err = Error::UpstreamFailure(format!(
                        "{} stream failed: {}",
                        state.provider, err
                    ));
                    state.stop();
                    return Some((Err(err), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

/// Decode a line as UTF-8 and trim it; blank lines yield `None`.
pub(crate) fn trimmed_line(line: &[u8]) -> Result<Option<&str>> {
    let line = std::str::from_utf8(line)
        .map_err(|e| Error::UpstreamFailure(format!("Invalid stream chunk: {}", e)))?
        .trim();
    Ok((!line.is_empty()).then_some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn body(parts: &[&'static str]) -> ByteStream {
        stream::iter(
            parts
                .iter()
                .copied()
                .map(|p| Ok(bytes::Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    fn upper(line: &[u8]) -> Result<Option<String>> {
        match trimmed_line(line)? {
            Some("bad") => Err(Error::UpstreamFailure("bad line".into())),
            Some(text) => Ok(Some(text.to_uppercase())),
            None => Ok(None),
        }
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_joined() {
        let pieces: Vec<String> = line_text_stream(body(&["ab", "c\n\nd", "e"]), "test", upper)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(pieces, vec!["ABC", "DE"]);
    }

    #[tokio::test]
    async fn first_error_ends_stream() {
        let mut stream = line_text_stream(body(&["one\nbad\nthree\n"]), "test", upper);
        assert_eq!(stream.next().await.unwrap().unwrap(), "ONE");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn trimmed_line_skips_blank_lines() {
        assert_eq!(trimmed_line(b"  \r\n").unwrap(), None);
        assert_eq!(trimmed_line(b" x \n").unwrap(), Some("x"));
        assert!(trimmed_line(&[0xff]).is_err());
    }
}
