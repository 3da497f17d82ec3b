// Todo server main entry point.
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use todo_pubsub::PubSub;
use todo_server::{app, config, observability};

#[tokio::main]
async fn main() -> Result<()> {
    run_with_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("todo-server");

    let config = config::ServerConfig::from_env_or_yaml()?;
    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let store = app::build_store(&config).await;
    let pubsub = Arc::new(
        PubSub::with_queue_capacity(config.queue_capacity)
            .context("build subscription fan-out")?,
    );
    let schema = app::build_schema_with(store, pubsub);
    let router = app::build_router(schema);

    let listener = tokio::net::TcpListener::bind(config.http_bind)
        .await
        .context("bind GraphQL listener")?;
    tracing::info!(addr = %listener.local_addr()?, "graphql listener started");

    let serve_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router.into_make_service()).await {
            tracing::warn!(error = %err, "graphql server exited");
        }
    });

    shutdown.await;
    serve_task.abort();
    tracing::info!("server stopped");
    Ok(())
}
