//! scholarcache - cached lookups against a slow scholar metadata provider
//!
//! Results are printed as JSON on stdout; logs go to stderr and are filtered
//! with `RUST_LOG` (default `info`).

use std::io::Write;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use scholarcache::cache::{sanitize_key, CacheFacade};
use scholarcache::cli::{describe_entry, Cli, Command};
use scholarcache::upstream::HttpFetcher;
use scholarcache::Outcome;

/// Installs the stderr log subscriber
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Command::Key { key } = &cli.command {
        println!("{}.json", sanitize_key(key));
        return Ok(ExitCode::SUCCESS);
    }

    let config = cli.config()?;
    let facade = CacheFacade::from_config(&config);

    match cli.command {
        Command::Get {
            key,
            endpoint,
            param,
        } => {
            let fetcher = HttpFetcher::new(&endpoint, param, config.fetch_timeout)?;
            let outcome = facade.get(&key, fetcher.fetch_fn(&key)).await;

            let code = match outcome {
                Outcome::Ready(payload) => {
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                    ExitCode::SUCCESS
                }
                Outcome::Failed(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            };
            std::io::stdout().flush()?;

            // Let an accepted background refresh finish before the process exits
            facade.refresher().wait_idle().await;
            Ok(code)
        }
        Command::Show { key } => match facade.store().load::<Value>(&key)? {
            Some(entry) => {
                let report = describe_entry(facade.store(), &entry, Utc::now(), config.ttl);
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("No cached record for '{}'", key);
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Key { .. } => Ok(ExitCode::SUCCESS),
    }
}
