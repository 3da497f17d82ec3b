// Gateway main entry point.
use anyhow::{Context, Result};
use std::future::Future;
use todo_gateway::{app, config, observability};

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
    let metrics_handle = observability::init_observability();

    let config = config::GatewayConfig::from_env_or_yaml()?;
    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let state = app::build_state(&config).await?;
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_bind)
        .await
        .context("bind gateway listener")?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listener started");

    let serve_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router.into_make_service()).await {
            tracing::warn!(error = %err, "gateway server exited");
        }
    });

    shutdown.await;
    serve_task.abort();
    tracing::info!("gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => unsafe {
                    std::env::set_var(self.key, value);
                },
                None => unsafe {
                    std::env::remove_var(self.key);
                },
            }
        }
    }

    #[tokio::test]
    #[serial]
    async fn run_with_shutdown_starts_and_stops() -> Result<()> {
        let _g1 = EnvGuard::set("TODO_GATEWAY_BIND", "127.0.0.1:0");
        let _g2 = EnvGuard::set("TODO_GATEWAY_METRICS_BIND", "127.0.0.1:0");
        let _g3 = EnvGuard::unset("TODO_GATEWAY_BACKEND");
        let _g4 = EnvGuard::unset("TODO_GATEWAY_CONFIG");
        run_with_shutdown(async {}).await?;
        Ok(())
    }
}
