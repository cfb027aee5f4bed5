// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sylas` - the Sylas operator CLI.
//!
//! A thin client over a running `sylasd`'s HTTP surface: `status` polls the
//! busy gauge, and `mock` crafts Linear-shaped webhook bodies so the full
//! ingress → session → runner pipeline can be exercised against the
//! `cli-mock` tracker without a real Linear workspace.

mod client;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::DaemonClient;
use crate::commands::mock::MockArgs;

#[derive(Parser)]
#[command(name = "sylas", version, about = "Operator CLI for the Sylas edge worker daemon")]
struct Cli {
    /// Base URL of a running sylasd (default http://127.0.0.1:3000)
    #[arg(long, global = true, default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the daemon is idle or busy
    Status,
    /// Send synthetic Linear-shaped webhook events to a running daemon
    Mock(MockArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new(cli.base_url);

    match cli.command {
        Commands::Status => commands::status::run(&client).await,
        Commands::Mock(args) => commands::mock::run(&client, args).await,
    }
}
