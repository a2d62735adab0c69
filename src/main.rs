//! # PDF Assistant CLI (`pdfa`)
//!
//! The `pdfa` binary starts the HTTP service and provides a few
//! operational commands around it.
//!
//! ## Usage
//!
//! ```bash
//! pdfa --config ./config/pdfa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfa serve` | Start the HTTP server |
//! | `pdfa check` | Validate config and credentials, report provider keys |
//! | `pdfa hash-password <pw>` | Print a bcrypt hash for the credentials file |
//! | `pdfa ask --file <pdf> "<q>"` | Index a PDF and answer one question |
//!
//! ## Examples
//!
//! ```bash
//! # Start the server with JSON logs
//! pdfa serve --log-format json
//!
//! # Ask a question against a local file using the "assistant" page settings
//! pdfa ask --file ./report.pdf --page assistant "What are the key findings?"
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use pdf_assistant::{ask_cmd, check, config, credentials, keys::ApiKeys, server};

/// PDF Assistant: role-gated question answering over uploaded PDFs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pdfa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pdfa",
    about = "PDF Assistant: role-gated question answering over uploaded PDFs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdfa.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Validate configuration and credentials, and list pages and keys.
    Check,

    /// Print a bcrypt hash of a password for the credentials file.
    HashPassword {
        password: String,
    },

    /// Index a PDF and answer one question about it.
    ///
    /// Uses the chunking, retrieval, provider and agent settings of the
    /// chosen page (the first configured page by default).
    Ask {
        /// The question to ask.
        question: String,

        /// PDF file to index.
        #[arg(long)]
        file: PathBuf,

        /// Page whose settings to use.
        #[arg(long)]
        page: Option<String>,
    },
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "pdf_assistant=info,tower_http=info",
        1 => "pdf_assistant=debug,tower_http=debug",
        _ => "pdf_assistant=trace,tower_http=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Commands::HashPassword { password } => {
            println!("{}", credentials::hash_password(&password)?);
        }
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Check => {
            let cfg = config::load_config(&cli.config)?;
            check::run_check(&cfg, &ApiKeys::from_env())?;
        }
        Commands::Ask {
            question,
            file,
            page,
        } => {
            let cfg = config::load_config(&cli.config)?;
            ask_cmd::run_ask(&cfg, &ApiKeys::from_env(), &file, page.as_deref(), &question).await?;
        }
    }

    Ok(())
}
