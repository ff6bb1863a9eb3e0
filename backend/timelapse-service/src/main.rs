use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use timelapse_service::{handlers, AppState, Config};
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let bind_addr = config.bind_address();
    info!(
        timelapse = %config.timelapse_folder.display(),
        snapshots = %config.snapshot_folder.display(),
        renders = %config.render_folder.display(),
        stream_fps = config.stream_fps,
        live_fps = config.live_fps,
        "Timelapse service starting on {bind_addr}"
    );

    let state = AppState::new(config);
    let shutdown = state.shutdown.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .disable_signals()
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind on {bind_addr}"))?
    .run();

    // Open MJPEG responses never finish on their own, so sessions are
    // cancelled before the graceful stop waits on them.
    let handle = server.handle();
    actix_web::rt::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received, closing streaming sessions");
        shutdown.cancel();
        handle.stop(true).await;
    });

    server.await.context("HTTP server error")?;
    info!("Timelapse service stopped");
    Ok(())
}
