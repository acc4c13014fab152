use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod convert;
mod cvss;
mod error;
mod lang;
mod model;
mod service;

use app::AppState;
use model::Config;

#[derive(Parser, Debug)]
#[command(
    name = "cve4to5",
    version,
    about = "Upconverts CVE records from the legacy v4 JSON format to the v5 record format"
)]
struct Cli {
    /// Convert a single v4 JSON file
    #[arg(short, long, conflicts_with = "input_dir")]
    input: Option<PathBuf>,

    /// Convert every .json file under this directory tree
    #[arg(short = 'd', long)]
    input_dir: Option<PathBuf>,

    /// Directory the v5 records are written into
    #[arg(short, long, default_value = "converted")]
    output: PathBuf,

    /// Check the support datasets and the identity service, then exit
    #[arg(long)]
    self_test: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let mut state = AppState::new(config).context("could not initialize the converter")?;

    if cli.self_test {
        state.self_test().await;
        return Ok(());
    }

    if let Some(input) = &cli.input {
        let written = state.convert_file(input, &cli.output).await?;
        tracing::info!(file = %written.display(), "Record converted");
        return Ok(());
    }

    if let Some(input_dir) = &cli.input_dir {
        state.run_batch(input_dir, &cli.output).await;
        state.report.print();
        return Ok(());
    }

    anyhow::bail!("nothing to do: pass --input FILE or --input-dir DIR (see --help)")
}
