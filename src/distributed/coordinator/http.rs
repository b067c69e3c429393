use std::collections::HashMap;

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::distributed::protocol::ErrorResponse;
use crate::error::CoordinationError;

const MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

pub(super) struct HttpRequest {
    pub(super) method: String,
    pub(super) path: String,
    pub(super) body: Vec<u8>,
}

/// Status code plus message for a request that cannot be served.
#[derive(Debug)]
pub(super) struct HttpError {
    pub(super) status: u16,
    pub(super) message: String,
}

impl HttpError {
    pub(super) fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<CoordinationError> for HttpError {
    fn from(err: CoordinationError) -> Self {
        let status = match &err {
            CoordinationError::UnknownClient { .. } | CoordinationError::UnknownTask { .. } => 404,
            CoordinationError::IncompatibleVersion { .. } => 409,
            CoordinationError::Deserialize { .. } | CoordinationError::InvalidHistogram { .. } => {
                400
            }
            CoordinationError::Bind { .. }
            | CoordinationError::Io { .. }
            | CoordinationError::Request { .. }
            | CoordinationError::Rejected { .. }
            | CoordinationError::BuildClientFailed { .. }
            | CoordinationError::NoTasksAssigned
            | CoordinationError::InvalidAssignment { .. }
            | CoordinationError::RetriesExhausted { .. }
            | CoordinationError::Serialize { .. }
            | CoordinationError::Merge { .. } => 500,
            #[cfg(test)]
            CoordinationError::TestExpectation { .. } => 500,
        };
        Self::new(status, err.to_string())
    }
}

pub(super) async fn read_http_request(socket: &mut TcpStream) -> Result<HttpRequest, HttpError> {
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let header_end;

    loop {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| HttpError::new(400, format!("Failed to read request: {}", err)))?;
        if bytes == 0 {
            return Err(HttpError::new(400, "Empty request"));
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| HttpError::new(400, "Invalid read length"))?;
        buffer.extend_from_slice(read_slice);
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(HttpError::new(413, "Request too large"));
        }
        if let Some(pos) = find_header_end(&buffer) {
            header_end = pos;
            break;
        }
    }

    let header_bytes = buffer
        .get(..header_end)
        .ok_or_else(|| HttpError::new(400, "Malformed request headers"))?;
    let header_text = std::str::from_utf8(header_bytes)
        .map_err(|err| HttpError::new(400, format!("Invalid request encoding: {}", err)))?;
    let mut lines = header_text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| HttpError::new(400, "Missing request line"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| HttpError::new(400, "Missing HTTP method"))?;
    let target = parts
        .next()
        .ok_or_else(|| HttpError::new(400, "Missing request path"))?;
    let path = target.split('?').next().unwrap_or(target);

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(HttpError::new(400, "Malformed header"));
        };
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    let content_length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(HttpError::new(413, "Request body too large"));
    }
    let body_start = header_end
        .checked_add(4)
        .ok_or_else(|| HttpError::new(400, "Malformed request headers"))?;
    let mut body = buffer.get(body_start..).unwrap_or_default().to_vec();
    while body.len() < content_length {
        let bytes = socket
            .read(&mut chunk)
            .await
            .map_err(|err| HttpError::new(400, format!("Failed to read body: {}", err)))?;
        if bytes == 0 {
            break;
        }
        let read_slice = chunk
            .get(..bytes)
            .ok_or_else(|| HttpError::new(400, "Invalid read length"))?;
        body.extend_from_slice(read_slice);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method: method.to_ascii_uppercase(),
        path: path.to_owned(),
        body,
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

const fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

pub(super) async fn write_json_response<T>(
    socket: &mut TcpStream,
    status: u16,
    response: &T,
) -> Result<(), CoordinationError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(response).map_err(|err| CoordinationError::Serialize {
        context: "coordinator response",
        source: err,
    })?;
    write_response(socket, status, &body).await
}

pub(super) async fn write_error_response(
    socket: &mut TcpStream,
    status: u16,
    message: &str,
) -> Result<(), CoordinationError> {
    let response = ErrorResponse {
        error: message.to_owned(),
    };
    write_json_response(socket, status, &response).await
}

async fn write_response(
    socket: &mut TcpStream,
    status: u16,
    body: &[u8],
) -> Result<(), CoordinationError> {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        status_text(status),
        body.len()
    );
    socket
        .write_all(head.as_bytes())
        .await
        .map_err(|err| CoordinationError::Io {
            context: "write coordinator response",
            source: err,
        })?;
    socket
        .write_all(body)
        .await
        .map_err(|err| CoordinationError::Io {
            context: "write coordinator response body",
            source: err,
        })?;
    socket.flush().await.map_err(|err| CoordinationError::Io {
        context: "flush coordinator response",
        source: err,
    })
}
