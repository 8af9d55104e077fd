use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::HttpError;

/// Upper bound on request line + headers.
const MAX_HEAD_BYTES: u64 = 16 * 1024;

/// Upper bound on a request body (task documents are small).
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// A parsed HTTP/1.1 request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Uppercased method, e.g. `"PUT"`.
    pub method: String,
    /// Raw request target as sent, e.g. `/tasks?id=1`.
    pub target: String,
    /// Percent-decoded path segments, e.g. `["tasks", "1", "executions"]`.
    pub segments: Vec<String>,
    /// Decoded query pairs, in order.
    pub query: Vec<(String, String)>,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Builds a request from its method and target (`/path?query`).
    pub fn new(method: &str, target: &str, body: Vec<u8>) -> Result<Self, HttpError> {
        if !target.starts_with('/') {
            return Err(HttpError::Malformed(format!("unsupported request target: {target}")));
        }
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                percent_encoding::percent_decode_str(s)
                    .decode_utf8()
                    .map(|d| d.into_owned())
                    .map_err(|_| HttpError::Malformed(format!("path is not valid UTF-8: {path}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let query = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            method: method.to_ascii_uppercase(),
            target: target.to_string(),
            segments,
            query,
            headers: Vec::new(),
            body,
        })
    }

    /// First value of the query parameter `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value of the header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Reads one request from the connection.
///
/// Returns `Ok(None)` when the peer closes the connection before
/// sending anything.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = (&mut *reader).take(MAX_HEAD_BYTES);

    let mut line = String::new();
    if head.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let request_line = complete_line(&line)?;

    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m.to_string(), t.to_string(), v),
        _ => return Err(HttpError::Malformed(format!("bad request line: {request_line}"))),
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed(format!("unsupported protocol: {version}")));
    }

    let mut headers = Vec::new();
    loop {
        line.clear();
        head.read_line(&mut line).await?;
        let header = complete_line(&line)?;
        if header.is_empty() {
            break;
        }
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| HttpError::Malformed(format!("bad header: {header}")))?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    let mut request = Request::new(&method, &target, Vec::new())?;
    request.headers = headers;

    if request.header("transfer-encoding").is_some() {
        return Err(HttpError::Malformed("chunked bodies are not supported".to_string()));
    }
    let length = match request.header("content-length") {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| HttpError::Malformed(format!("bad content-length: {raw}")))?,
        None => 0,
    };
    if length > MAX_BODY_BYTES {
        return Err(HttpError::BodyTooLarge(MAX_BODY_BYTES));
    }

    request.body = vec![0u8; length];
    reader.read_exact(&mut request.body).await?;
    Ok(Some(request))
}

/// Strips the line terminator; a line without one means the head
/// limit was hit or the peer hung up mid-request.
fn complete_line(line: &str) -> Result<&str, HttpError> {
    match line.strip_suffix('\n') {
        Some(l) => Ok(l.strip_suffix('\r').unwrap_or(l)),
        None if line.len() as u64 >= MAX_HEAD_BYTES => Err(HttpError::HeadTooLarge(MAX_HEAD_BYTES)),
        None => Err(HttpError::Malformed("incomplete request head".to_string())),
    }
}
