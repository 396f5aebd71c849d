//! Accept loops over an [`AsyncServer`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;

use crate::error::NetResult;
use crate::socket::{AsyncClient, AsyncServer};

/// Pause after a failed accept, so a persistent fault (e.g. EMFILE)
/// doesn't spin the loop.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Running accept loop. Closing or dropping it stops accepting; clients
/// already handed to the handler keep running.
#[derive(Debug)]
pub struct ListenHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenHandle {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("accept loop stopped");
        }
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Accept connections forever, running `handler` on its own task for each.
///
/// Accept errors are logged and the loop carries on after
/// [`ACCEPT_ERROR_BACKOFF`].
pub fn listen<F, Fut>(server: Arc<dyn AsyncServer>, handler: F) -> ListenHandle
where
    F: Fn(Box<dyn AsyncClient>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handler = Arc::new(handler);
    let task = tokio::spawn(async move {
        tracing::info!(host = %server.host(), port = server.port(), "listening");
        loop {
            match server.accept().await {
                Ok(client) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        handler(client).await;
                    });
                }
                Err(e) => {
                    tracing::warn!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    });
    ListenHandle { task: Some(task) }
}

/// Accepted connections as a lazy stream. Each poll accepts one client.
pub fn incoming(server: Arc<dyn AsyncServer>) -> BoxStream<'static, NetResult<Box<dyn AsyncClient>>> {
    stream::unfold(server, |server| async move {
        let next = server.accept().await;
        Some((next, server))
    })
    .boxed()
}
