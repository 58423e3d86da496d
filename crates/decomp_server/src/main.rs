use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use decomp_engine::JobService;
use decomp_logging::{decomp_info, decomp_warn};
use decomp_server::{api_routes, logging, AppState, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::initialize(args.log_destination(), args.log_level);

    let jobs = JobService::start(args.engine_config()).context("failed to start job service")?;
    let state = Arc::new(AppState::new(jobs));
    let app = api_routes(state.clone());

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    decomp_info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    decomp_info!("Waiting for running jobs to finish");
    match Arc::try_unwrap(state) {
        Ok(state) => state.shutdown().await,
        Err(_) => decomp_warn!("Handlers still hold the job service; exiting without draining"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        decomp_warn!("Failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    decomp_info!("Shutdown requested");
}
