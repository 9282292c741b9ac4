use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use shell::{load_settings, MessageLog, Settings, Shell};
use status_client::{StatusPusher, StatusStream};
use tracing::info;

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; defaults to ./shell.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the screens and follow the status stream until Ctrl-C.
    Run {
        #[arg(long)]
        stream_url: Option<String>,
    },
    /// Send one status line to the server's push endpoint.
    Push {
        text: String,
        #[arg(long)]
        push_url: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref());

    match cli.command {
        Command::Run { stream_url } => {
            if let Some(url) = stream_url {
                settings.stream_url = url;
            }
            run(settings).await?;
        }
        Command::Push { text, push_url } => {
            if let Some(url) = push_url {
                settings.push_url = url;
            }
            StatusPusher::new(settings.push_url.clone()).push(&text).await?;
            println!("pushed to {}: {text}", settings.push_url);
        }
    }

    Ok(())
}

async fn run(settings: Settings) -> Result<()> {
    let log = MessageLog::new(settings.log_viewport_rows).with_renderer(|entry| {
        println!("[{}] {}", entry.received_at.format("%H:%M:%S"), entry.text);
    });
    let shell = Shell::with_log(&settings, log)?;
    let screen = shell.start()?;
    println!("showing {screen} at {}", shell.view().location());

    let stream = StatusStream::new(settings.stream_url.clone())
        .with_event_name(settings.event_name.clone());
    shell.connect(&stream)?;

    tokio::select! {
        _ = shell.run() => info!("shell document closed"),
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
