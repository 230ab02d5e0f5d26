//! # Toposcrape - Topology Scraper
//!
//! The main binary for the Toposcrape topology pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 apps/toposcrape (THE BINARY)                 │
//! │                                                              │
//! │   ┌─────────────┐     ┌──────────────┐     ┌─────────────┐   │
//! │   │    CLI      │ ──▶ │ FileScraper  │ ──▶ │   Runner    │   │
//! │   │   (clap)    │     │ (file://)    │     │             │   │
//! │   └─────────────┘     └──────────────┘     └──────┬──────┘   │
//! │                                                   │          │
//! │                  direct, or Ingester ▶ Broker ▶ Digester     │
//! │                                                   ▼          │
//! │                                        ┌──────────────────┐  │
//! │                                        │ toposcrape-core  │  │
//! │                                        │   (THE LOGIC)    │  │
//! │                                        └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! toposcrape scrape -o file:///tmp/dump.json --format dot
//! toposcrape scrape -o file:///tmp/dump.json --via-broker --format json
//! toposcrape subgraph -o file:///tmp/dump.json --uid svc-web --depth 2
//! toposcrape query -o file:///tmp/dump.json --namespace prod --kind Pod
//! ```

use clap::Parser;
use toposcrape::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // TOPOSCRAPE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TOPOSCRAPE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "toposcrape=info,toposcrape_core=info".into());

    // Logs go to stderr; stdout carries the command output.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet {
        print_banner();
    }

    match cli::execute(cli).await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    eprintln!("toposcrape v{}", env!("CARGO_PKG_VERSION"));
}
