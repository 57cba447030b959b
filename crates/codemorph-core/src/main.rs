//! Codemorph Core CLI - inspect the graph built for a repository
//!
//! Commands:
//! - `stats` - Node and edge counts by type
//! - `graph` - Serialized subgraph of one file
//! - `verify` - Invariant checks and rebuild comparison

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use codemorph_config::{ConfigLoader, ConfigOverrides};
use codemorph_core::{Codebase, GraphStats, Language, LanguageSelection};

/// Codemorph Core - codebase graph inspection
#[derive(Parser)]
#[command(name = "codemorph-core")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root
    #[arg(short, long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Parse only this language (python or typescript)
    #[arg(short, long, global = true)]
    language: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show node and edge counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the subgraph of one file as JSON
    Graph {
        /// File path, relative to the repository root
        file: String,
    },

    /// Check graph invariants and compare against a rebuild
    Verify,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let selection = match cli.language.as_deref() {
        None => LanguageSelection::Auto,
        Some(name) => {
            let language = Language::ALL
                .into_iter()
                .find(|l| l.as_str() == name)
                .with_context(|| format!("Unknown language: {}", name))?;
            LanguageSelection::Explicit(language)
        }
    };
    let codebase = open(&cli.repo, selection)?;

    match cli.command {
        Commands::Stats { json } => cmd_stats(&codebase, json),
        Commands::Graph { file } => cmd_graph(&codebase, &file),
        Commands::Verify => cmd_verify(&codebase),
    }
}

fn open(repo: &Path, selection: LanguageSelection) -> Result<Codebase> {
    let config = ConfigLoader::new()
        .load(repo, Some(&ConfigOverrides::default()))
        .context("Failed to load configuration")?;

    let start = Instant::now();
    let codebase = Codebase::open_with_language(repo, selection, config)
        .with_context(|| format!("Failed to open repository {:?}", repo))?;
    info!("Graph built in {:.2}s", start.elapsed().as_secs_f64());
    Ok(codebase)
}

fn cmd_stats(codebase: &Codebase, json_output: bool) -> Result<()> {
    let stats = codebase.stats();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

fn print_stats(stats: &GraphStats) {
    println!("\nGraph Statistics");
    println!("================");
    println!("  Files: {}", stats.files);
    println!("  Directories: {}", stats.directories);
    println!("  Generation: {}", stats.generation);
    println!();
    println!("Nodes by type:");
    for (node_type, count) in &stats.nodes {
        println!("  {:<10} {}", node_type.as_str(), count);
    }
    println!();
    println!("Edges by type:");
    for (edge_type, count) in &stats.edges {
        println!("  {:<26} {}", edge_type.as_str(), count);
    }
}

fn cmd_graph(codebase: &Codebase, file: &str) -> Result<()> {
    let value = codebase
        .file_subgraph(file)
        .with_context(|| format!("Failed to serialize {}", file))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn cmd_verify(codebase: &Codebase) -> Result<()> {
    let report = codebase.verify();
    if report.is_ok() {
        println!("Graph verified: no violations");
        return Ok(());
    }
    for violation in &report.violations {
        println!("  {}", violation);
    }
    anyhow::bail!("{} violation(s) found", report.violations.len())
}
