//! GM console entry point.
//!
//! Loads the TOML config, applies command-line overrides, starts the
//! configured listeners, and runs the operator shell on stdin until `quit`
//! or Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ Console::new()          -- session table, event hub, registry, dispatch
//!  └─ add_listener(port)...   -- one accept task per configured port
//!  └─ event printer task      -- prints client logs and tree updates
//!  └─ Shell                   -- reads stdin, runs operator commands
//! ```
//!
//! Diagnostics go to stderr through `tracing`; shell output goes to stdout.

use std::future::Future;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gm_console::infrastructure::shell::{render_event, Shell, ShellFlow};
use gm_console::infrastructure::storage::config::{load_config, save_config, ConsoleConfig};
use gm_console::{Console, ConsoleSettings};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Operator console for live GM sessions with remote game clients.
///
/// Values given here override the config file.
#[derive(Debug, Parser)]
#[command(name = "gm-console", version)]
struct Cli {
    /// Config file to read instead of the platform default.
    #[arg(long, env = "GM_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address listeners bind to.
    #[arg(long, env = "GM_CONSOLE_BIND")]
    bind: Option<String>,

    /// Port to listen on at startup; repeat for several. Replaces the
    /// configured list.
    #[arg(long = "port", env = "GM_CONSOLE_PORTS", value_delimiter = ',')]
    ports: Vec<u16>,

    /// Client log lines kept in memory.
    #[arg(long, env = "GM_CONSOLE_LOG_RETENTION")]
    log_retention: Option<usize>,

    /// Write the effective configuration back to the config file, then continue.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut ConsoleConfig) {
        if let Some(bind) = &self.bind {
            config.network.bind_address = bind.clone();
        }
        if !self.ports.is_empty() {
            config.network.ports = self.ports.clone();
        }
        if let Some(retention) = self.log_retention {
            config.console.log_retention = retention;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_to(&mut config);

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(&config.console.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
        }))
        .init();

    if cli.write_config {
        let path = save_config(&config, cli.config.as_deref())
            .context("failed to write configuration")?;
        info!(path = %path.display(), "configuration written");
    }

    let settings = ConsoleSettings::from_config(&config).context("invalid configuration")?;
    info!(bind = %settings.bind_address, ports = ?config.network.ports, "GM console starting");
    let console = Arc::new(Console::new(settings));

    for &port in &config.network.ports {
        if let Err(e) = console.add_listener(port).await {
            error!(port, error = %e, "could not start listener");
        }
    }

    // ── Event printer ─────────────────────────────────────────────────────────
    let mut events = console.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render_event(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "event printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    run_shell(Arc::clone(&console)).await;

    console.shutdown().await;
    info!("GM console stopped");
    Ok(())
}

/// Reads operator commands until `quit`, Ctrl-C, or (after stdin closes) Ctrl-C.
async fn run_shell(console: Arc<Console>) {
    let mut shell = Shell::new(console);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("type `help` for commands");

    loop {
        print!("{}", shell.prompt());
        let _ = std::io::stdout().flush();

        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    // A send stalled on an unresponsive peer must not block Ctrl-C.
                    let command = shell.handle_line(&line);
                    match unless_interrupted(command, wait_for_ctrl_c()).await {
                        Some(ShellFlow::Continue(text)) if text.is_empty() => {}
                        Some(ShellFlow::Continue(text)) => println!("{text}"),
                        Some(ShellFlow::Quit) | None => return,
                    }
                }
                Ok(None) => {
                    info!("stdin closed; running until Ctrl-C");
                    wait_for_ctrl_c().await;
                    return;
                }
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    wait_for_ctrl_c().await;
                    return;
                }
            },
            _ = wait_for_ctrl_c() => return,
        }
    }
}

/// Runs `work` to completion, or returns `None` if `interrupt` resolves first.
async fn unless_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future<Output = ()>,
) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        () = interrupt => None,
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
