use anyhow::{Context, Result};
use model_server::http::router;
use model_server::settings::ServerSettings;
use model_server::{watcher, ArtifactLocator, ModelService};
use once_cell::sync::Lazy;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = ServerSettings::load()?;
    recsys_core::init_tracing(&settings.service_name)?;
    Lazy::force(&model_server::metrics::SERVING_METRICS);

    let locator = ArtifactLocator::from_environment().with_default_fetcher();
    let service = match ModelService::start(locator).await {
        Ok(svc) => svc,
        Err(e) => {
            error!(error = %e, kind = e.kind(), "initial model load failed");
            return Err(e.into());
        }
    };
    recsys_core::mark_ready();

    let _watch = if settings.watch_artifact {
        Some(watcher::spawn_artifact_watcher(service.clone(), settings.watch_debounce())?)
    } else {
        None
    };

    let addr = settings.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("bind {addr}"))?;
    info!(%addr, watch = settings.watch_artifact, "model-server listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            recsys_core::clear_ready();
        })
        .await?;
    Ok(())
}
