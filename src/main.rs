#![forbid(unsafe_code)]

//! `kak-buddy`: demo host for the buddy runtime.
//!
//! Connects to a Kakoune session, declares a few commands answered by this
//! process and serves them until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use kak_buddy::snippet::escape::quote;
use kak_buddy::transport::kak::KakTransport;
use kak_buddy::transport::recording::RecordingTransport;
use kak_buddy::{Buddy, BuddyConfig, BuddyError, FieldSet, Result, Transport};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "kak-buddy", about = "Serve host-side commands to a Kakoune session", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Kakoune session to attach to; overrides the configuration.
    #[arg(long)]
    session: Option<String>,

    /// Client to evaluate in; overrides the configuration.
    #[arg(long)]
    client: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the generated commands instead of sending them.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("kak-buddy bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| BuddyError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match (&args.config, &args.session) {
        (Some(path), _) => BuddyConfig::load_from_path(path)?,
        (None, Some(session)) => BuddyConfig::for_session(session.clone()),
        (None, None) => {
            return Err(BuddyError::Config(
                "either --config or --session is required".into(),
            ))
        }
    };
    if let Some(session) = args.session {
        config.session = session;
    }
    if let Some(client) = args.client {
        config.client = Some(client);
    }
    config.validate()?;
    info!(session = config.session, "configuration loaded");

    // ── Start the runtime ───────────────────────────────
    let recorder = args
        .dry_run
        .then(|| RecordingTransport::new(config.session.clone()));
    let transport: Arc<dyn Transport> = match &recorder {
        Some(recorder) => Arc::new(recorder.clone()),
        None => Arc::new(KakTransport::from_config(&config)),
    };
    let base = Buddy::init(FieldSet::standard(), transport, &config.channel).await?;
    let buddy = match &config.client {
        Some(client) => base.focus(client.clone()),
        None => base,
    };

    if let Err(err) = define_commands(&buddy).await {
        error!(%err, "failed to declare commands");
        buddy.teardown().await?;
        return Err(err);
    }

    if let Some(recorder) = recorder {
        for sent in recorder.sent() {
            println!("{}\n", sent.focus.wrap(&sent.text));
        }
        return buddy.teardown().await;
    }

    info!("kak-buddy ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    buddy.teardown().await?;
    info!("kak-buddy shut down");
    Ok(())
}

async fn define_commands(buddy: &Buddy) -> Result<()> {
    buddy
        .def("buddy-what-buffile", "", &["buffile"], |fields| {
            match fields.text("buffile") {
                Ok(buffile) => info!(buffile, "buddy-what-buffile"),
                Err(err) => error!(%err, "buddy-what-buffile"),
            }
        })
        .await?;

    buddy
        .def_with_reply("buddy-what-selection", "", &["selection"], |fields| {
            let selection = fields.text("selection")?;
            Ok(format!(
                "info {}",
                quote(&format!("{} chars selected", selection.chars().count()))
            ))
        })
        .await?;

    buddy
        .def_with_reply(
            "buddy-cursor",
            "",
            &["cursor_line", "cursor_column"],
            |fields| {
                let line = fields.integer("cursor_line")?;
                let column = fields.integer("cursor_column")?;
                Ok(format!("echo {}", quote(&format!("cursor at {line}.{column}"))))
            },
        )
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| BuddyError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| BuddyError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
