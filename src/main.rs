// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use streamfold::config::{self, Config, FileSource};
use streamfold::delta;
use streamfold::finalize::FinalReport;
use streamfold::pipeline::{build_pipeline, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ShapeArg {
    /// Accept any JSON value
    Any,
    /// Use the config's shape when it declares one
    Config,
}

#[derive(Parser)]
#[command(
    name = "streamfold",
    about = "Replay recorded model deltas through the streamfold pipeline"
)]
struct Cli {
    /// Path to a streamfold.yaml config file
    #[arg(long, env = "STREAMFOLD_CONFIG")]
    config: Option<PathBuf>,

    /// Transport profile (overrides the config's default transport)
    #[arg(long, env = "STREAMFOLD_TRANSPORT")]
    transport: Option<String>,

    /// Shape the final value is validated against
    #[arg(long, value_enum, default_value_t = ShapeArg::Config)]
    shape: ShapeArg,

    /// JSONL file with one delta per line
    input: PathBuf,
}

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_INVALID: i32 = 2;
const EXIT_ABANDONED: i32 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let mut config = match &cli.config {
        Some(path) => match config::load_config(&FileSource::new(path)) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("failed to load config: {e}");
                return EXIT_ERROR;
            }
        },
        None => Config::builtin(),
    };
    if cli.shape == ShapeArg::Any {
        config.shape = None;
    }

    let pipeline = match build_pipeline(&config, cli.transport.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("failed to build pipeline: {e}");
            return EXIT_ERROR;
        }
    };

    let text = match tokio::fs::read_to_string(&cli.input).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(input = %cli.input.display(), "failed to read input: {e}");
            return EXIT_ERROR;
        }
    };
    let deltas = match delta::parse_jsonl(&text) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(input = %cli.input.display(), "{e}");
            return EXIT_ERROR;
        }
    };

    tracing::info!(
        input = %cli.input.display(),
        deltas = deltas.len(),
        transport = %pipeline.profile().name,
        config_hash = %config.config_hash,
        "replaying deltas"
    );

    let mut frames = pipeline.stream(tokio_stream::iter(deltas));
    while let Some(snapshot) = frames.next().await {
        print_json(&snapshot);
    }

    match frames.finalize() {
        Outcome::Completed(result) => {
            let report = FinalReport::from(&result);
            print_json(&report);
            if report.ok {
                EXIT_OK
            } else {
                EXIT_INVALID
            }
        }
        Outcome::Abandoned { frames } => {
            tracing::warn!(frames, "input ended without an end-of-stream delta");
            EXIT_ABANDONED
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!("failed to serialize output: {e}"),
    }
}
