// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tollgate::args::Args;
use tollgate::runner;
use tollgate_config::TollgateConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // If the version flag is set, print the version and exit
    if args.version() {
        println!("tollgate {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config =
        TollgateConfig::from_file(args.config()).context("failed to load configuration")?;

    // tracing subscriber initialization
    config.tracing.setup_tracing_subscriber();

    info!(
        config = %args.config().display(),
        mode = %config.mode,
        listen = %config.listen,
        "starting tollgate"
    );

    runner::run(config).await
}
