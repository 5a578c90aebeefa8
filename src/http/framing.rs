//! Minimal HTTP/1.x request framing
//!
//! Accepts exactly one `POST` to the MCP path with a `Content-Length` body and
//! writes exactly one response with `Connection: close`.

use std::{io, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::timeout,
};

pub const MAX_LINE_BYTES: usize = 8 * 1024;
pub const MAX_HEADER_LINES: usize = 100;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

#[derive(Debug, Clone)]
pub struct FramingLimits {
    pub path: String,
    pub max_body_bytes: usize,
    /// Longest wait for the request line and for each header line.
    pub header_read_timeout: Duration,
    /// Longest single wait for more body bytes.
    pub body_read_wait: Duration,
    /// Consecutive empty waits tolerated before the body is declared missing.
    pub body_read_attempts: u32,
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("unsupported request target: {0}")]
    UnsupportedTarget(String),
    #[error("malformed header line")]
    MalformedHeader,
    #[error("header section exceeds limits")]
    HeadersTooLarge,
    #[error("request head not received within {0:?}")]
    HeaderTimeout(Duration),
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),
    #[error("Transfer-Encoding is not supported")]
    UnsupportedTransferEncoding,
    #[error("declared body of {declared} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { declared: u64, limit: usize },
    #[error("body incomplete: received {received} of {declared} bytes")]
    IncompleteBody { received: usize, declared: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FramingError {
    /// Plain-text body of the 400 response.
    pub fn response_message(&self) -> &'static str {
        match self {
            Self::BodyTooLarge { .. } => "Request too large",
            Self::IncompleteBody { .. } => "Empty request body",
            _ => "Bad Request",
        }
    }
}

/// Reads one request and returns its body.
pub async fn read_request<R>(
    reader: &mut R,
    limits: &FramingLimits,
) -> Result<Vec<u8>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = read_line(reader, limits.header_read_timeout)
        .await?
        .ok_or(FramingError::MalformedRequestLine)?;
    check_request_line(&request_line, &limits.path)?;

    let content_length = read_headers(reader, limits.header_read_timeout).await?;
    let declared = parse_content_length(content_length, limits.max_body_bytes)?;

    read_body(reader, declared, limits).await
}

async fn read_line<R>(reader: &mut R, wait: Duration) -> Result<Option<String>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = timeout(
        wait,
        (&mut *reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut line),
    )
    .await
    .map_err(|_| FramingError::HeaderTimeout(wait))??;
    if read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(FramingError::HeadersTooLarge);
    }
    let line = String::from_utf8(line).map_err(|_| FramingError::MalformedHeader)?;
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn check_request_line(line: &str, expected_path: &str) -> Result<(), FramingError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(FramingError::MalformedRequestLine);
    };
    if !version.starts_with("HTTP/1.") {
        return Err(FramingError::MalformedRequestLine);
    }

    let path = target.split_once('?').map_or(target, |(path, _)| path);
    if method != "POST" || path != expected_path {
        return Err(FramingError::UnsupportedTarget(format!("{method} {target}")));
    }
    Ok(())
}

/// Consumes header lines through the blank separator and returns the raw
/// `Content-Length` value, if any.
async fn read_headers<R>(reader: &mut R, wait: Duration) -> Result<Option<String>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length = None;
    for _ in 0..MAX_HEADER_LINES {
        let line = read_line(reader, wait)
            .await?
            .ok_or(FramingError::MalformedHeader)?;
        if line.is_empty() {
            return Ok(content_length);
        }

        let (name, value) = line.split_once(':').ok_or(FramingError::MalformedHeader)?;
        let name = name.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = Some(value.trim().to_string());
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            return Err(FramingError::UnsupportedTransferEncoding);
        }
    }
    Err(FramingError::HeadersTooLarge)
}

fn parse_content_length(raw: Option<String>, max_body_bytes: usize) -> Result<usize, FramingError> {
    let raw = raw.ok_or(FramingError::MissingContentLength)?;
    let declared = match raw.parse::<u64>() {
        Ok(value) if value > 0 => value,
        _ => return Err(FramingError::InvalidContentLength(raw)),
    };
    if declared > max_body_bytes as u64 {
        return Err(FramingError::BodyTooLarge {
            declared,
            limit: max_body_bytes,
        });
    }
    Ok(declared as usize)
}

/// Reads exactly `declared` bytes, tolerating slow senders for a bounded
/// number of short waits.
async fn read_body<R>(
    reader: &mut R,
    declared: usize,
    limits: &FramingLimits,
) -> Result<Vec<u8>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = vec![0u8; declared];
    let mut received = 0;
    let mut idle_waits = 0;

    while received < declared {
        match timeout(limits.body_read_wait, reader.read(&mut body[received..])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(read)) => {
                received += read;
                idle_waits = 0;
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                idle_waits += 1;
                if idle_waits >= limits.body_read_attempts {
                    break;
                }
            }
        }
    }

    if received < declared {
        return Err(FramingError::IncompleteBody { received, declared });
    }
    Ok(body)
}

pub async fn write_response<W>(
    writer: &mut W,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await
}

pub async fn write_json_response<W>(writer: &mut W, body: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_response(writer, "200 OK", JSON_CONTENT_TYPE, body.as_bytes()).await
}

pub async fn write_bad_request<W>(writer: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_response(writer, "400 Bad Request", TEXT_CONTENT_TYPE, message.as_bytes()).await
}
