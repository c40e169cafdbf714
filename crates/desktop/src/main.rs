// gristdesk: desktop shell entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gristdesk_common::path::normalize_path;
use gristdesk_desktop::config::DesktopConfig;
use gristdesk_desktop::runtime::{self, Role};
use tracing::info;

#[derive(Parser)]
#[command(name = "gristdesk", version, about = "Open Grist documents as local files")]
struct Cli {
    /// Document or importable file to open.
    file: Option<PathBuf>,

    /// Config file to use instead of ~/.gristdesk/config.toml.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(log_path) = gristdesk_desktop::logging::init()? {
        info!(path = %log_path.display(), "writing debug log");
    }

    let config = DesktopConfig::load(cli.config.as_deref()).context("failed to load config")?;
    let file = match cli.file {
        Some(file) => {
            let cwd = std::env::current_dir().context("failed to read working directory")?;
            Some(normalize_path(&file, &cwd).with_context(|| format!("invalid path `{}`", file.display()))?)
        }
        None => None,
    };

    match runtime::run(config, file).await.context("gristdesk terminated unexpectedly")? {
        Role::Primary => info!("gristdesk stopped"),
        Role::HandedOver => info!("handed over to the running instance"),
    }
    Ok(())
}
