// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-host
//!
//! Command-line driver for the graph-host execution manager.
//!
//! ## Usage
//! ```bash
//! # Execute a model once and print its outputs
//! graph-host run --model demos/residual.json --input x=1,2,3,4 --input skip=0,0,1,1 --trace trace.json
//!
//! # Flood the scheduler with requests at mixed priorities
//! graph-host -c demos/manager.toml bench --model demos/residual.json --requests 5000 --workers 4
//!
//! # Inspect a model's inputs, weights and nodes
//! graph-host inspect --model demos/residual.json
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "graph-host",
    about = "Register compiled graphs and execute them asynchronously",
    version,
    author
)]
struct Cli {
    /// Path to a TOML manager configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a model, execute it once and print its outputs.
    Run {
        /// Path to the graph JSON file.
        #[arg(short, long)]
        model: PathBuf,

        /// SafeTensors file holding the model's weights.
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Input values as `name=v1,v2,...` (repeatable). Missing inputs
        /// are zero-filled.
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Request priority (higher runs sooner).
        #[arg(short, long, default_value_t = 0)]
        priority: u64,

        /// Write a Chrome trace of the execution to this path.
        #[arg(short, long)]
        trace: Option<PathBuf>,
    },

    /// Submit many concurrent requests at mixed priorities and report stats.
    Bench {
        /// Path to the graph JSON file.
        #[arg(short, long)]
        model: PathBuf,

        /// SafeTensors file holding the model's weights.
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Number of requests to submit.
        #[arg(short, long, default_value_t = 1000)]
        requests: usize,

        /// Number of distinct priority levels to cycle through.
        #[arg(long, default_value_t = 4)]
        priorities: u64,

        /// Worker threads (overrides the config file).
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print a model's inputs, weights, nodes and memory estimates.
    Inspect {
        /// Path to the graph JSON file.
        #[arg(short, long)]
        model: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            model,
            weights,
            inputs,
            priority,
            trace,
        } => {
            commands::run::execute(cli.config, model, weights, inputs, priority, trace).await
        }
        Commands::Bench {
            model,
            weights,
            requests,
            priorities,
            workers,
        } => {
            commands::bench::execute(cli.config, model, weights, requests, priorities, workers)
                .await
        }
        Commands::Inspect { model } => commands::inspect::execute(model).await,
    }
}
