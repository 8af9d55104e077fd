//! Minimal HTTP/1.1 front-end for the task API.
//!
//! Requests are parsed by hand over a tokio `TcpStream`: request line,
//! headers, and a `Content-Length` body. No keep-alive, no chunked
//! encoding. That is all the `/tasks` API needs.

pub mod request;
pub mod response;
pub mod routes;
pub mod server;

use std::time::Duration;

use thiserror::Error;

pub use routes::Router;
pub use server::serve;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed request: {0}")]
    Malformed(String),
    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(u64),
    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("Request not received within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl HttpError {
    /// Status code sent back when the request could not be parsed.
    pub fn status(&self) -> u16 {
        match self {
            HttpError::Io(_) | HttpError::Malformed(_) => 400,
            HttpError::HeadTooLarge(_) => 431,
            HttpError::BodyTooLarge(_) => 413,
            HttpError::Timeout(_) => 408,
        }
    }
}
