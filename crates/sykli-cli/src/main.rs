// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sykli_cli::commands::{self, RunArgs, TargetChoice};
use sykli_cli::config::{load_config, EngineConfig};
use sykli_cli::diagnostic;

#[derive(Parser, Debug)]
#[command(name = "sykli", version, about = "Sykli CI orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project root to operate on.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Only run tasks whose name matches this glob pattern.
    #[arg(long, global = true)]
    filter: Option<String>,

    /// Execution backend: local or k8s.
    #[arg(long, global = true, default_value = "local")]
    target: String,

    /// Override the global run timeout, in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Run even if the git working copy has uncommitted changes.
    #[arg(long, global = true)]
    allow_dirty: bool,

    /// Emit debug-level logs.
    #[arg(long, global = true)]
    verbose: bool,

    /// Disable ANSI color in diagnostic output.
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the graph (default when no subcommand is given).
    Run,

    /// Parse and print the task graph as JSON.
    Graph,

    /// Run only tasks whose inputs intersect the git diff since the last good run.
    Delta,

    /// Write `.sykli/context.json`, a snapshot of recent runs for AI/tooling consumers.
    Context,

    /// Inspect or maintain the content-addressed cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print cache entry/blob counts and total size.
    Stats,
    /// Remove every cache entry and blob.
    Clean,
    /// Remove cache entries older than 30 days.
    Gc,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("sykli=debug") } else { EnvFilter::new("sykli=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let exit_code = run(cli).await;
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> i32 {
    let target: TargetChoice = match cli.target.parse() {
        Ok(t) => t,
        Err(message) => {
            eprintln!("error: {message}");
            return 2;
        }
    };

    let config_path = cli.root.join("sykli.toml");
    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return 2;
        }
    };

    let run_args = RunArgs {
        root: cli.root.clone(),
        filter: cli.filter.clone(),
        target,
        timeout_seconds: cli.timeout,
        allow_dirty: cli.allow_dirty,
    };

    let command = cli.command.unwrap_or(Commands::Run);
    let color = !cli.no_color;

    match command {
        Commands::Run => match commands::cmd_run(run_args, &config).await {
            Ok((report, code)) => {
                print_summary(&report);
                code
            }
            Err(e) => {
                print_error(&e, color);
                e.exit_code()
            }
        },
        Commands::Delta => match commands::cmd_delta(run_args, &config).await {
            Ok((report, code)) => {
                print_summary(&report);
                code
            }
            Err(e) => {
                print_error(&e, color);
                e.exit_code()
            }
        },
        Commands::Graph => match commands::cmd_graph(&cli.root).await {
            Ok(json) => {
                println!("{json}");
                0
            }
            Err(e) => {
                print_error(&e, color);
                e.exit_code()
            }
        },
        Commands::Context => match commands::cmd_context(&cli.root, &config) {
            Ok(path) => {
                println!("wrote {}", path.display());
                0
            }
            Err(e) => {
                print_error(&e, color);
                e.exit_code()
            }
        },
        Commands::Cache { action } => run_cache_action(action, &config, color),
    }
}

fn run_cache_action(action: CacheAction, config: &EngineConfig, color: bool) -> i32 {
    let result = match action {
        CacheAction::Stats => commands::cmd_cache_stats(config).map(|stats| {
            println!("entries: {}", stats.entry_count);
            println!("blobs:   {}", stats.blob_count);
            println!("bytes:   {}", stats.total_bytes);
        }),
        CacheAction::Clean => commands::cmd_cache_clean(config).map(|report| {
            println!("removed {} entries, {} blobs", report.removed_entries, report.removed_blobs);
        }),
        CacheAction::Gc => commands::cmd_cache_gc(config).map(|report| {
            println!("removed {} entries, {} blobs", report.removed_entries, report.removed_blobs);
        }),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            print_error(&e, color);
            e.exit_code()
        }
    }
}

fn print_summary(report: &sykli_scheduler::RunReport) {
    for task in &report.tasks {
        println!("{:<24} {}", task.name, task.status.as_str());
    }
    println!("---");
    println!("overall: {:?}", report.overall);
}

fn print_error(error: &sykli_error::SykliError, color: bool) {
    eprint!("{}", diagnostic::render(error, color));
}
