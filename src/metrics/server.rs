//! HTTP server exposing the scrape and health endpoints

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::warn;

use super::MetricsCollector;
use crate::{Error, Result};

/// A bound-but-not-yet-serving metrics endpoint.
///
/// Binding and serving are split so the caller can log the resolved address
/// (the configured port may be 0) before the accept loop starts.
pub struct MetricsServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl MetricsServer {
    /// Bind `host:port` and build the router (`GET /metrics`,
    /// `GET /health`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unparseable host and an IO error if
    /// the address cannot be bound.
    pub async fn bind(host: &str, port: u16, collector: Arc<MetricsCollector>) -> Result<Self> {
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|_| Error::Config(format!("invalid metrics address {host}:{port}")))?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let router = Router::new()
            .route("/metrics", get(scrape_handler))
            .route("/health", get(health_handler))
            .with_state(collector);

        Ok(Self {
            listener,
            router,
            local_addr,
        })
    }

    /// The address the listener actually bound.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` resolves, then drain gracefully.
    ///
    /// # Errors
    ///
    /// Propagates IO errors from the accept loop.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn scrape_handler(State(collector): State<Arc<MetricsCollector>>) -> Response {
    match collector.scrape().await {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!("metrics scrape failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "healthy\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{
        BlockParams, ExperimentDescriptor, ExperimentKind, ExperimentParams, ExperimentRegistry,
    };
    use crate::results::ResultsLog;

    async fn collector(dir: &std::path::Path) -> Arc<MetricsCollector> {
        let descriptor = ExperimentDescriptor::new(
            ExperimentKind::Write,
            ExperimentParams::Blocks(BlockParams {
                nr_blocks: 10,
                block_byte_size: 100,
            }),
        )
        .expect("descriptor");
        let registry =
            Arc::new(ExperimentRegistry::from_descriptors(vec![descriptor]).expect("registry"));
        let results = Arc::new(
            ResultsLog::open(dir.join("results"))
                .await
                .expect("results"),
        );
        Arc::new(MetricsCollector::new(registry, results))
    }

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = MetricsServer::bind("127.0.0.1", 0, collector(dir.path()).await)
            .await
            .expect("bind");
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(
            MetricsServer::bind("not a host", 0, collector(dir.path()).await)
                .await
                .is_err()
        );
    }
}
