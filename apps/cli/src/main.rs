mod config;
mod progress;
mod remote;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use stratus_connection::Connection;
use stratus_log_stream::{LogStream, StreamState};
use stratus_protocol::messages::AuthRequest;
use stratus_protocol::types::Deployment;
use stratus_sync::{SyncOptions, SyncSession};

use crate::config::ClientConfig;
use crate::progress::ProgressRenderer;
use crate::remote::SessionRemote;

#[derive(Parser)]
#[command(name = "stratus", version, about = "Deploy project trees to the Stratus platform")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a project tree and create a deployment
    Deploy {
        /// Project root (defaults to the current directory)
        path: Option<PathBuf>,

        /// Create a new deployment even if an identical one exists
        #[arg(long)]
        force_new: bool,

        /// Upload every file regardless of what the server already holds
        #[arg(long)]
        force_sync: bool,

        /// Do not tail the build log after deploying
        #[arg(long)]
        no_logs: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Deploy {
            path,
            force_new,
            force_sync,
            no_logs,
        } => deploy(path, force_new, force_sync, no_logs).await,
    }
}

async fn deploy(
    path: Option<PathBuf>,
    force_new: bool,
    force_sync: bool,
    no_logs: bool,
) -> anyhow::Result<()> {
    let config = ClientConfig::load()?;

    let root = match path {
        Some(p) => p,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());

    let auth = AuthRequest {
        token: config.token.clone(),
        client_name: hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_default(),
        version: env!("CARGO_PKG_VERSION").into(),
    };
    let (conn, ok) = Connection::connect(&config.session_url(), &auth)
        .await
        .context("connecting to the platform")?;
    debug!(session_id = %ok.session_id, "session established");

    let options = SyncOptions {
        force_new,
        force_sync,
        ..Default::default()
    };
    let remote = Arc::new(SessionRemote::new(conn));
    let mut session = SyncSession::new(remote.clone(), options);

    // A dropped socket mid-session cancels the pipeline instead of
    // leaving it waiting on request timeouts.
    let cancel = session.cancel_token();
    remote
        .connection()
        .set_disconnect_callback(Box::new(move || {
            tracing::warn!("connection to the platform lost");
            cancel.cancel();
        }))
        .await;

    let render_handle = session.take_events().map(|mut rx| {
        tokio::spawn(async move {
            let mut renderer = ProgressRenderer::new();
            while let Some(event) = rx.recv().await {
                renderer.handle(&event);
            }
            renderer.finish_line();
        })
    });

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancelling...");
            cancel.cancel();
        }
    });

    let result = session.run(&root).await;
    session.close().await;
    drop(session); // lets the renderer drain and exit
    if let Some(handle) = render_handle {
        let _ = handle.await;
    }

    let outcome = result.context("deployment failed")?;
    if outcome.cached {
        println!("deployed from cache: {}", outcome.deployment.url);
    } else {
        println!("deployed: {}", outcome.deployment.url);
    }

    if !no_logs {
        // A broken log stream never un-deploys anything; report and exit 0.
        if let Err(e) = tail_logs(&config, &outcome.deployment).await {
            eprintln!("log stream unavailable: {e}");
        }
    }

    Ok(())
}

async fn tail_logs(config: &ClientConfig, deployment: &Deployment) -> anyhow::Result<()> {
    let mut stream = LogStream::connect(&config.server_url, &deployment.host, &config.token)
        .await
        .context("opening log stream")?;
    eprintln!("tailing build log for {} (ctrl-c to stop)", deployment.host);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                stream.close().await;
                break;
            }
            line = stream.next_line() => match line {
                Some(line) => {
                    let ts = chrono::DateTime::from_timestamp_millis(line.timestamp)
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!("{ts} {}", line.text);
                }
                None => break,
            }
        }
    }

    if stream.state() == StreamState::Errored {
        eprintln!("log stream lost; the deployment itself is unaffected");
    }
    Ok(())
}
