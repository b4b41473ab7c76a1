//! logpose terminal shell.
//!
//! `logpose [config.toml]` reads one line per turn from stdin and prints
//! the narrative. All behaviour lives in the library.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use logpose_core::LogposeConfig;
use logpose_session::{Reply, Session, commands};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "logpose.toml";

fn load_config() -> anyhow::Result<LogposeConfig> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => LogposeConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG);
            if path.is_file() {
                LogposeConfig::from_file(&path).with_context(|| format!("loading config from {DEFAULT_CONFIG}"))
            } else {
                Ok(LogposeConfig::default())
            }
        }
    }
}

fn prompt() -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;
    Ok(())
}

fn print_hud<G>(session: &Session<G>) {
    match session.world() {
        Ok(world) => println!("{}", commands::hud(&world)),
        Err(e) => println!("Error: {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    let (text_layer, json_layer) = if config.general.log_json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)), None)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.general.log_level.clone().into()),
        )
        .with(text_layer)
        .with(json_layer)
        .init();

    tracing::info!(data_dir = %config.store.data_dir.display(), "starting logpose");

    let mut session = Session::from_config(config).context("configuring the generation service")?;
    print_hud(&session);
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match session.handle(&line).await {
            Ok(Reply::Turn(outcome)) => {
                println!("\n{}\n", outcome.narrative);
                if let Some(notice) = outcome.notice() {
                    println!("{notice}");
                }
                print_hud(&session);
            }
            Ok(Reply::Command { message, .. }) => println!("{message}"),
            Ok(Reply::Nothing) => {}
            Err(e) => println!("Error: {e}"),
        }
        prompt()?;
    }

    Ok(())
}
