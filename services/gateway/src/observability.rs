//! Gateway observability: structured logs plus a Prometheus endpoint.
//!
//! The gateway skips span export; its handlers are short-lived and the
//! registry metrics carry the interesting signal.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
#[cfg(test)]
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_observability() -> PrometheusHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    init_subscriber(subscriber);
    install_metrics_recorder()
}

/// Serve `/metrics`, `/live`, and `/ready` on the given address.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let app = axum::Router::new()
        .route(
            "/metrics",
            axum::routing::get(move || async move { handle.render() }),
        )
        .route("/live", axum::routing::get(|| async { "ok" }))
        .route("/ready", axum::routing::get(|| async { "ok" }));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await
}

fn install_metrics_recorder() -> PrometheusHandle {
    #[cfg(test)]
    {
        // Recorder installation is global; reuse across tests.
        if let Some(handle) = METRICS_HANDLE.get() {
            return handle.clone();
        }
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("install metrics recorder");
        let _ = METRICS_HANDLE.set(handle.clone());
        handle
    }
    #[cfg(not(test))]
    {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("install metrics recorder")
    }
}

fn init_subscriber<S>(subscriber: S)
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    #[cfg(test)]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = subscriber.try_init();
    }
    #[cfg(not(test))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        subscriber.init();
    }
}
