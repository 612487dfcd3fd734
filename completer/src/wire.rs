//! Framed JSON messaging for stdio engines.
//!
//! Engines speak `Content-Length: N\r\n\r\n{json}` frames over
//! stdin/stdout. Outgoing traffic is a request (numeric `id` + `method`) or
//! a notification (`method` only); incoming traffic is a response (`id` +
//! `result` or `error`) or a notification.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Frame size ceiling (4 MiB) against unbounded allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A classified incoming frame.
#[derive(Debug)]
pub(crate) enum Incoming {
    Response {
        id: u64,
        result: Result<serde_json::Value, String>,
    },
    Notification {
        method: String,
    },
}

impl Incoming {
    /// Classify a decoded frame; `None` for shapes we don't recognize.
    pub fn classify(frame: &serde_json::Value) -> Option<Self> {
        if let Some(id) = frame.get("id").and_then(serde_json::Value::as_u64) {
            let result = if let Some(error) = frame.get("error") {
                Err(error
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unspecified engine error")
                    .to_string())
            } else {
                Ok(frame.get("result").cloned().unwrap_or(serde_json::Value::Null))
            };
            return Some(Self::Response { id, result });
        }
        frame
            .get("method")
            .and_then(serde_json::Value::as_str)
            .map(|method| Self::Notification {
                method: method.to_string(),
            })
    }
}

/// Reads framed JSON messages from an async reader.
pub(crate) struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame. `Ok(None)` on clean EOF between frames.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(length) = self.read_content_length().await? else {
            return Ok(None);
        };

        if length > MAX_FRAME_BYTES {
            bail!("frame of {length} bytes exceeds the {MAX_FRAME_BYTES} byte ceiling");
        }

        let mut body = vec![0u8; length];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;

        serde_json::from_slice(&body)
            .map(Some)
            .context("decoding frame body")
    }

    /// Consume header lines up to the blank separator and return the
    /// `Content-Length` value, or `None` on EOF before any header byte.
    async fn read_content_length(&mut self) -> Result<Option<usize>> {
        let mut length = None;
        let mut line = String::new();
        let mut mid_headers = false;

        loop {
            line.clear();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .context("reading frame header")?;

            if read == 0 {
                // EOF between frames is a clean shutdown; EOF after a
                // partial header block is not.
                if mid_headers {
                    bail!("engine closed the stream mid-headers");
                }
                return Ok(None);
            }
            mid_headers = true;

            let header = line.trim();
            if header.is_empty() {
                break;
            }
            if let Some(value) = header
                .split_once(':')
                .filter(|(key, _)| key.eq_ignore_ascii_case("Content-Length"))
                .map(|(_, value)| value)
            {
                length = Some(
                    value
                        .trim()
                        .parse()
                        .context("parsing Content-Length value")?,
                );
            }
            // Other headers (e.g. Content-Type) are ignored.
        }

        match length {
            Some(length) => Ok(Some(length)),
            None => bail!("frame headers carried no Content-Length"),
        }
    }
}

/// Writes framed JSON messages to an async writer.
pub(crate) struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let body = serde_json::to_vec(message).context("encoding frame body")?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let request = Request {
            id: 7,
            method: "parse",
            params: Some(serde_json::json!({ "filepath": "/ws/Program.cs" })),
        };

        let mut buf = Vec::new();
        FrameWriter::new(&mut buf).write_frame(&request).await.unwrap();

        let frame = FrameReader::new(buf.as_slice())
            .read_frame()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame["id"], 7);
        assert_eq!(frame["method"], "parse");
        assert_eq!(frame["params"]["filepath"], "/ws/Program.cs");
    }

    #[tokio::test]
    async fn test_notification_omits_missing_params() {
        let notification = Notification {
            method: "exit",
            params: None,
        };
        let mut buf = Vec::new();
        FrameWriter::new(&mut buf)
            .write_frame(&notification)
            .await
            .unwrap();

        let frame = FrameReader::new(buf.as_slice())
            .read_frame()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame["method"], "exit");
        assert!(frame.get("params").is_none(), "params must be omitted");
        assert!(frame.get("id").is_none());
    }

    #[tokio::test]
    async fn test_multiple_frames_in_sequence() {
        let mut buf = Vec::new();
        let mut writer = FrameWriter::new(&mut buf);
        writer
            .write_frame(&serde_json::json!({ "id": 1 }))
            .await
            .unwrap();
        writer
            .write_frame(&serde_json::json!({ "id": 2 }))
            .await
            .unwrap();

        let mut reader = FrameReader::new(buf.as_slice());
        assert_eq!(reader.read_frame().await.unwrap().unwrap()["id"], 1);
        assert_eq!(reader.read_frame().await.unwrap().unwrap()["id"], 2);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_between_frames_is_clean() {
        let mut reader = FrameReader::new(&b""[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_headers_is_error() {
        let mut reader = FrameReader::new(&b"Content-Length: 10\r\n"[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_eof_mid_body_is_error() {
        let mut reader = FrameReader::new(&b"Content-Length: 50\r\n\r\n{}"[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_content_length_is_error() {
        let mut reader = FrameReader::new(&b"Content-Type: application/json\r\n\r\n{}"[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_header_name_is_case_insensitive() {
        let body = r#"{"id":3}"#;
        let stream = format!("content-length: {}\r\n\r\n{body}", body.len());
        let mut reader = FrameReader::new(stream.as_bytes());
        assert_eq!(reader.read_frame().await.unwrap().unwrap()["id"], 3);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let stream = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        let mut reader = FrameReader::new(stream.as_bytes());
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_content_length_counts_bytes_not_chars() {
        let message = serde_json::json!({ "text": "café" });
        let mut buf = Vec::new();
        FrameWriter::new(&mut buf).write_frame(&message).await.unwrap();

        let mut reader = FrameReader::new(buf.as_slice());
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame["text"], "café");
    }

    #[test]
    fn test_classify_success_response() {
        let incoming = Incoming::classify(&serde_json::json!({
            "id": 4,
            "result": { "ready": true }
        }))
        .unwrap();
        match incoming {
            Incoming::Response { id, result } => {
                assert_eq!(id, 4);
                assert_eq!(result.unwrap()["ready"], true);
            }
            Incoming::Notification { .. } => panic!("expected a response"),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let incoming = Incoming::classify(&serde_json::json!({
            "id": 5,
            "error": { "message": "unknown method" }
        }))
        .unwrap();
        match incoming {
            Incoming::Response { result, .. } => {
                assert_eq!(result.unwrap_err(), "unknown method");
            }
            Incoming::Notification { .. } => panic!("expected a response"),
        }
    }

    #[test]
    fn test_classify_notification() {
        let incoming =
            Incoming::classify(&serde_json::json!({ "method": "ready" })).unwrap();
        assert!(matches!(incoming, Incoming::Notification { method } if method == "ready"));
    }

    #[test]
    fn test_classify_rejects_malformed_frames() {
        assert!(Incoming::classify(&serde_json::json!({ "noise": 1 })).is_none());
        assert!(Incoming::classify(&serde_json::json!("just a string")).is_none());
    }
}
