use serde::Serialize;
use tracing::error;

/// An HTTP response, always sent with `Connection: close` and
/// permissive CORS headers (the API is called from browser UIs).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: Some("application/json"),
                body,
            },
            Err(e) => {
                error!("Failed to serialize response body: {e}");
                Self::text(500, "Internal server error")
            }
        }
    }

    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some("text/plain; charset=utf-8"),
            body: message.into().into_bytes(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Serializes status line, headers and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status));
        if let Some(content_type) = self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Access-Control-Allow-Origin: *\r\n");
        head.push_str("Access-Control-Allow-Methods: GET, PUT, DELETE, OPTIONS\r\n");
        head.push_str("Access-Control-Allow-Headers: Content-Type\r\n");
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_response_bytes() {
        let response = Response::json(201, &json!({"id": "1"}));
        let raw = String::from_utf8(response.to_bytes()).unwrap();

        assert!(raw.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(raw.contains("Content-Type: application/json\r\n"));
        assert!(raw.contains("Content-Length: 10\r\n"));
        assert!(raw.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(raw.ends_with("\r\n\r\n{\"id\":\"1\"}"));
    }

    #[test]
    fn test_empty_response_has_no_content_type() {
        let raw = String::from_utf8(Response::empty(404).to_bytes()).unwrap();
        assert!(raw.starts_with("HTTP/1.1 404 Not Found\r\n"));
        // The CORS header names Content-Type, but no Content-Type header is sent
        assert!(raw.contains("Access-Control-Allow-Headers: Content-Type\r\n"));
        assert!(!raw.lines().any(|line| line.starts_with("Content-Type:")));
        assert!(raw.contains("Content-Length: 0\r\n"));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_timeout_reason_phrase() {
        let raw = String::from_utf8(Response::text(408, "late").to_bytes()).unwrap();
        assert!(raw.starts_with("HTTP/1.1 408 Request Timeout\r\n"));
    }

    #[test]
    fn test_text_response() {
        let response = Response::text(404, "Task with ID 9 not found.");
        assert_eq!(response.body, b"Task with ID 9 not found.");
        assert_eq!(response.content_type, Some("text/plain; charset=utf-8"));
    }
}
