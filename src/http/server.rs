use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::request::read_request;
use super::response::Response;
use super::routes::Router;
use super::HttpError;

/// Accepts connections until `shutdown` resolves, one spawned task per
/// connection.
///
/// Each connection carries exactly one request; executions can hold
/// a connection for the whole provisioning timeout without blocking
/// anyone else. On shutdown the listener is closed and every
/// in-flight connection is awaited, so no execution is cut off before
/// its unit is deleted.
pub async fn serve<F>(
    listener: TcpListener,
    router: Arc<Router>,
    read_timeout: Duration,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    info!("HTTP server listening on {}", listener.local_addr()?);

    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let router = router.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, &router, read_timeout).await {
                            debug!("Connection from {peer} ended with error: {e}");
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {e}"),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!("Connection task failed: {e}");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    drop(listener);
    if !connections.is_empty() {
        info!("Waiting for {} in-flight request(s) to finish", connections.len());
    }
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!("Connection task failed: {e}");
        }
    }
    info!("HTTP server stopped");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    router: &Router,
    read_timeout: Duration,
) -> Result<(), HttpError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let received = tokio::time::timeout(read_timeout, read_request(&mut reader))
        .await
        .unwrap_or(Err(HttpError::Timeout(read_timeout)));

    let response = match received {
        Ok(Some(request)) => {
            let response = router.handle(&request).await;
            info!("{} {} -> {}", request.method, request.target, response.status);
            response
        }
        Ok(None) => return Ok(()),
        Err(HttpError::Io(e)) => return Err(HttpError::Io(e)),
        Err(e) => {
            warn!("Rejected request: {e}");
            Response::text(e.status(), e.to_string())
        }
    };

    writer.write_all(&response.to_bytes()).await?;
    writer.shutdown().await?;
    Ok(())
}
