use crate::server;
use jscope_core::daemon::Daemon;
use jscope_core::daemon::manifest::Manifest;
use jscope_core::logging::{LogBroadcaster, init_logging};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

pub struct Options {
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub clear: bool,
    pub logfile: Option<PathBuf>,
    pub quit_after: Option<u64>,
    pub verbose: bool,
    pub silent: bool,
}

pub async fn run(opts: Options) -> Result<(), Box<dyn std::error::Error>> {
    let broadcaster = LogBroadcaster::new();
    let _guard = init_logging(
        opts.logfile.as_deref(),
        !opts.silent,
        opts.verbose,
        &broadcaster,
    );

    let data_dir = opts.data_dir.unwrap_or_else(default_data_dir);
    let (manifest, replay) = Manifest::open(&data_dir, opts.clear)?;
    let (mut daemon, handle) = Daemon::new(manifest)?;

    // everything recorded by a previous run is indexed again before the
    // listener opens, so clients never race the replay
    daemon.replay(replay).await;
    tokio::spawn(daemon.run());

    let listener = TcpListener::bind(("127.0.0.1", opts.port)).await?;
    info!("listening on port {}", opts.port);

    match opts.quit_after {
        Some(secs) => {
            tokio::select! {
                result = server::accept_loop(listener, handle, broadcaster) => result,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("quit-after of {} seconds reached, shutting down", secs);
                    Ok(())
                }
            }
        }
        None => server::accept_loop(listener, handle, broadcaster).await,
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".jscope"))
        .unwrap_or_else(|| PathBuf::from(".jscope"))
}
