//! MCP Transport Layer
//!
//! Newline-delimited JSON-RPC 2.0 over any async byte stream. The server
//! uses stdio; tests drive it over in-memory pipes.

use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// One line read from the client
#[derive(Debug)]
pub enum Incoming {
    Request(JsonRpcRequest),
    /// A line that is not a valid JSON-RPC message
    Malformed(String),
}

/// Reading half of the transport
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Read the next message. Blank lines are skipped; `None` means EOF.
    ///
    /// Only I/O failures are errors. A line that is not UTF-8 or not JSON
    /// comes back as [`Incoming::Malformed`].
    pub async fn next(&mut self) -> io::Result<Option<Incoming>> {
        loop {
            self.buf.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut self.buf).await?;

            if bytes_read == 0 {
                return Ok(None); // EOF
            }

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    tracing::error!("Received non UTF-8 line: {}", e);
                    return Ok(Some(Incoming::Malformed(format!("Invalid UTF-8: {}", e))));
                }
            };
            if line.is_empty() {
                continue;
            }

            return Ok(Some(match serde_json::from_str(line) {
                Ok(request) => Incoming::Request(request),
                Err(e) => {
                    tracing::error!("Failed to parse JSON-RPC request: {}", e);
                    Incoming::Malformed(e.to_string())
                }
            }));
        }
    }
}

/// Writing half of the transport
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one JSON-RPC response followed by a newline
    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> io::Result<()> {
        let json = serde_json::to_string(response)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::JsonRpcError;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reader_skips_blank_lines() {
        let input = b"\n  \n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut reader = LineReader::new(BufReader::new(&input[..]));

        match reader.next().await.unwrap() {
            Some(Incoming::Request(request)) => assert_eq!(request.method, "ping"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_reports_malformed_line() {
        let input = b"{not json}\n";
        let mut reader = LineReader::new(BufReader::new(&input[..]));
        assert!(matches!(
            reader.next().await.unwrap(),
            Some(Incoming::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_reader_survives_invalid_utf8() {
        let mut input = Vec::new();
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n");
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n");
        let mut reader = LineReader::new(BufReader::new(&input[..]));

        assert!(matches!(
            reader.next().await.unwrap(),
            Some(Incoming::Request(_))
        ));
        match reader.next().await.unwrap() {
            Some(Incoming::Malformed(message)) => assert!(message.contains("UTF-8")),
            other => panic!("unexpected {:?}", other),
        }
        match reader.next().await.unwrap() {
            Some(Incoming::Request(request)) => {
                assert_eq!(request.id, Some(serde_json::json!(2)))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_emits_one_line_per_response() {
        let mut out = Vec::new();
        {
            let mut writer = LineWriter::new(&mut out);
            let response = JsonRpcResponse::success(
                Some(serde_json::json!(1)),
                serde_json::json!({"status": "ok"}),
            );
            writer.write_response(&response).await.unwrap();
            let error = JsonRpcResponse::error(
                Some(serde_json::json!(2)),
                JsonRpcError::method_not_found("unknown"),
            );
            writer.write_response(&error).await.unwrap();
        }

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"jsonrpc\":\"2.0\""));
        assert!(lines[1].contains("-32601"));
    }
}
