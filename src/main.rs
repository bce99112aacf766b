//! CLI entry point for the cloudsea request tool.

use anyhow::{Context, Result};
use clap::Parser;
use cloudsea_core::{Client, ClientOptions, ConfigOverrides};
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, error_report};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries only the response payload.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_layer = match &args.config {
        Some(path) => ConfigOverrides::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ConfigOverrides::default(),
    };
    let layer = args.config_layer(file_layer);
    layer.validate()?;

    let mut client = Client::new(ClientOptions::new().ext(layer));
    client.on_complete(|ctx, error| match error {
        None => info!(
            url = %ctx.request.url,
            attempts = ctx.task.attempts,
            elapsed = ?ctx.task.elapsed,
            "request complete"
        ),
        Some(error) => warn!(
            url = %ctx.request.url,
            attempts = ctx.task.attempts,
            kind = %error.kind(),
            "request failed"
        ),
    });

    match client.request(args.request_options()).await {
        Ok(reply) => {
            println!("{}", serde_json::to_string_pretty(&reply.into_value())?);
            Ok(())
        }
        Err(error) => {
            eprintln!("{}", serde_json::to_string_pretty(&error_report(&error))?);
            std::process::exit(1);
        }
    }
}
