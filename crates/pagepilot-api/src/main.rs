//! PagePilot CLI and HTTP bridge entry point.
//!
//! Binary name: `ppilot`
//!
//! Parses CLI arguments, installs tracing, wires the content and background
//! routers, then runs one command or serves the HTTP bridge.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use pagepilot_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands, LogFormatArg};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_directive = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "info,pagepilot_core=debug,pagepilot_infra=debug,ppilot=debug",
        _ => "trace",
    };
    init_tracing(&TracingOptions {
        format: match cli.log_format {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        },
        enable_otel: cli.otel,
        default_directive: default_directive.to_string(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "ppilot", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.ephemeral).await?;
    let result = run(&state, cli).await;

    state.shutdown();
    shutdown_tracing();
    result
}

async fn run(state: &AppState, cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Ask {
            question,
            page,
            no_rag,
            message_id,
        } => cli::ask::ask(state, question, page, no_rag, message_id, cli.json).await,

        Commands::History { tab } => cli::session::history(state, &tab, cli.json).await,

        Commands::Clear { tab } => cli::session::clear(state, &tab, cli.json).await,

        Commands::Check => cli::check::check(state, cli.json).await,

        Commands::Serve { port, host } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} PagePilot bridge listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state.clone());
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
            Ok(())
        }

        Commands::Completions { .. } => unreachable!("handled before state init"),
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
