pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use time::OffsetDateTime;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use tcr_service::TcrService;

#[derive(Debug, Parser)]
#[command(
	version = tcr_cli::VERSION,
	rename_all = "kebab",
	styles = tcr_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = tcr_config::load(&args.config)?;

	init_tracing(&config);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let purge_every = Duration::from_secs(config.jobs.purge_interval_secs);
	let state = AppState::new(config).await?;
	let purge = spawn_purge_loop(state.service.clone(), purge_every);
	let app = routes::router(state);
	let listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(listener, app).await?;
	purge.abort();

	Ok(())
}

/// Periodically drops terminal jobs past their retention window.
pub fn spawn_purge_loop(service: Arc<TcrService>, every: Duration) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));

		loop {
			ticker.tick().await;

			let purged = service.jobs.purge_expired(OffsetDateTime::now_utc());

			tracing::debug!(purged, remaining = service.jobs.len(), "Job purge tick.");
		}
	})
}

fn init_tracing(config: &tcr_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
