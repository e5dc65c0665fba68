//! CLI command definitions for the `ppilot` binary.
//!
//! The CLI plays the UI role: it loads a page into the content context,
//! then talks to the routers through the same envelopes a chat panel would.

pub mod ask;
pub mod check;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde_json::Value;

use pagepilot_types::envelope::ResponseEnvelope;

/// Ask questions about web pages, grounded in their content.
#[derive(Parser)]
#[command(name = "ppilot", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed logs (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    pub log_format: LogFormatArg,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Keep sessions in memory only; nothing is written to the data directory.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

/// Where the page being discussed comes from.
#[derive(clap::Args, Debug, Clone)]
pub struct PageArgs {
    /// Tab identifier the conversation is keyed by.
    #[arg(short, long, default_value = "1")]
    pub tab: String,

    /// File holding the page's visible text (`-` reads stdin).
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// URL the page was loaded from.
    #[arg(short, long, default_value = "about:blank")]
    pub url: String,

    /// Page title.
    #[arg(long, default_value = "")]
    pub title: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask one question about a page.
    Ask {
        /// The question.
        question: String,

        #[command(flatten)]
        page: PageArgs,

        /// Send the whole page instead of retrieved excerpts.
        #[arg(long)]
        no_rag: bool,

        /// Client-chosen id for the user turn.
        #[arg(long)]
        message_id: Option<String>,
    },

    /// Show the conversation recorded for a tab.
    History {
        /// Tab identifier.
        #[arg(short, long, default_value = "1")]
        tab: String,
    },

    /// Drop the conversation and page index of a tab.
    Clear {
        /// Tab identifier.
        #[arg(short, long, default_value = "1")]
        tab: String,
    },

    /// Serve the message bridge over HTTP.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3917")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Verify the configured model backend by streaming a short reply.
    Check,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// The success data of `response`, or an error carrying its code.
pub fn into_data(response: ResponseEnvelope) -> anyhow::Result<Value> {
    response
        .into_result()
        .map_err(|e| anyhow::anyhow!("{}: {}", e.code, e.message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pagepilot_types::envelope::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_parses_page_arguments() {
        let cli = Cli::try_parse_from([
            "ppilot", "ask", "what does it cost?", "--tab", "9", "--file", "page.txt", "--no-rag",
        ])
        .unwrap();
        match cli.command {
            Commands::Ask { question, page, no_rag, .. } => {
                assert_eq!(question, "what does it cost?");
                assert_eq!(page.tab, "9");
                assert_eq!(page.file, Some(PathBuf::from("page.txt")));
                assert!(no_rag);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_failure_envelope_becomes_error() {
        let err = into_data(ResponseEnvelope::failure(ErrorCode::HandlerNotFound, "nope")).unwrap_err();
        assert_eq!(err.to_string(), "HANDLER_NOT_FOUND: nope");
        assert_eq!(into_data(ResponseEnvelope::success(json!(1))).unwrap(), json!(1));
    }
}
