//! Line framing codec
//!
//! Every message is a single JSON value followed by `\n`:
//! ```text
//! <JSON body>\n
//! ```
//! Writers flush after every line so the peer never waits on a buffered message.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Sanity limit on a single line; 64MB is far beyond any real payload
pub const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// One framed line as read from the stream
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    /// Line content without its terminator
    Data(Vec<u8>),
    /// The line exceeded the limit; its bytes were consumed and discarded
    TooLong { length: usize },
}

/// Read one line from the stream, limited to [`MAX_LINE_BYTES`]
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Line>> {
    read_line_limited(reader, MAX_LINE_BYTES).await
}

/// Read one line, buffering at most `limit` bytes of it
///
/// Returns `Ok(None)` on a clean end of stream. The trailing newline (and a
/// preceding `\r`, if any) is stripped. Bytes are returned undecoded so the
/// caller can report invalid UTF-8 as a decode failure rather than an IO error.
/// An oversized line is skipped through its newline, which keeps the stream
/// framed for the next read.
pub async fn read_line_limited<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    limit: usize,
) -> io::Result<Option<Line>> {
    let mut line = Vec::new();
    let mut length = 0usize;
    let mut started = false;

    loop {
        let (consumed, complete) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                if !started {
                    return Ok(None);
                }
                break;
            }
            started = true;

            let (chunk, consumed, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };

            length += chunk.len();
            if length <= limit {
                line.extend_from_slice(chunk);
            } else if !line.is_empty() {
                line = Vec::new();
            }
            (consumed, complete)
        };

        reader.consume(consumed);
        if complete {
            break;
        }
    }

    if length > limit {
        return Ok(Some(Line::TooLong { length }));
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Ok(Some(Line::Data(line)))
}

/// Write one line to the stream and flush it
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, json: &str) -> io::Result<()> {
    debug_assert!(!json.contains('\n'), "serialized JSON never contains raw newlines");

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn data_line(bytes: &[u8]) -> Line {
        Line::Data(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_read_lines_until_eof() {
        let data = b"{\"a\":1}\n{\"b\":2}\r\n".to_vec();
        let mut reader = BufReader::new(Cursor::new(data));

        assert_eq!(read_line(&mut reader).await.unwrap(), Some(data_line(b"{\"a\":1}")));
        assert_eq!(read_line(&mut reader).await.unwrap(), Some(data_line(b"{\"b\":2}")));
        assert!(read_line(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_final_line_without_newline() {
        let mut reader = BufReader::new(Cursor::new(b"tail".to_vec()));
        assert_eq!(read_line(&mut reader).await.unwrap(), Some(data_line(b"tail")));
        assert!(read_line(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_keeps_invalid_utf8() {
        let mut reader = BufReader::new(Cursor::new(vec![0xff, 0xfe, b'\n']));
        assert_eq!(read_line(&mut reader).await.unwrap(), Some(data_line(&[0xff, 0xfe])));
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let data = b"0123456789abcdef\nok\n".to_vec();
        // A tiny buffer forces the long line across several fills
        let mut reader = BufReader::with_capacity(4, Cursor::new(data));

        assert_eq!(
            read_line_limited(&mut reader, 8).await.unwrap(),
            Some(Line::TooLong { length: 16 })
        );
        assert_eq!(read_line_limited(&mut reader, 8).await.unwrap(), Some(data_line(b"ok")));
        assert!(read_line_limited(&mut reader, 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept() {
        let mut reader = BufReader::with_capacity(3, Cursor::new(b"12345678\r\n".to_vec()));
        assert_eq!(read_line_limited(&mut reader, 9).await.unwrap(), Some(data_line(b"12345678")));
    }

    #[tokio::test]
    async fn test_write_line() {
        let mut output = Vec::new();
        write_line(&mut output, "{\"test\":true}").await.unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "{\"test\":true}\n");
    }
}
