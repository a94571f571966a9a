//! sieve - pick what to back up and derive include/exclude rules.
//!
//! Usage:
//!   sieve scan [PATH] [-- SELECTION...]     Size tree with selection state
//!   sieve rules [PATH] [-- SELECTION...]    Minimal include/exclude rules
//!   sieve export [PATH] [-- SELECTION...]   Export tree and selection to JSON
//!   sieve --help                            Show help
//!
//! A selection is `+rel/path` (include) or `-rel/path` (exclude), applied in
//! the order given.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, Context, Result};
use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sievefile_core::{NodeId, Resolved, Selection, SelectionEngine, Tree};
use sievefile_rules::{derive_rules, rsync_filter};
use sievefile_scan::{start_scan, ScanConfig, ScanMessage};

#[derive(Parser)]
#[command(
    name = "sieve",
    version,
    about = "Pick exactly what to back up and derive minimal include/exclude rules",
    long_about = "sieve scans a directory, shows how much space every entry takes, \
                  applies include/exclude choices and prints the smallest ordered \
                  rule list that reproduces them.\n\n\
                  Selections are `+rel/path` or `-rel/path`; put them after `--`."
)]
struct Cli {
    /// TOML scan configuration; command-line flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan and show the size tree with selection state
    Scan {
        /// Path to scan (defaults to the config root, then the current directory)
        path: Option<PathBuf>,

        /// Maximum depth to display
        #[arg(short, long, default_value = "3")]
        depth: u32,

        /// Show all entries (no depth limit on display)
        #[arg(short, long)]
        all: bool,

        /// Number of top entries to show per directory
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,

        #[command(flatten)]
        scan: ScanArgs,

        /// Selections to apply (`+path` or `-path`)
        #[arg(last = true)]
        selections: Vec<SelectionArg>,
    },

    /// Derive include/exclude rules for a selection
    Rules {
        /// Path to scan (defaults to the config root, then the current directory)
        path: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: RulesFormat,

        #[command(flatten)]
        scan: ScanArgs,

        /// Selections to apply (`+path` or `-path`)
        #[arg(last = true)]
        selections: Vec<SelectionArg>,
    },

    /// Export the scanned tree with selection state to JSON
    Export {
        /// Path to scan (defaults to the config root, then the current directory)
        path: Option<PathBuf>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,

        /// Selections to apply (`+path` or `-path`)
        #[arg(last = true)]
        selections: Vec<SelectionArg>,
    },
}

/// Scan flags shared by every subcommand.
#[derive(Args, Default)]
struct ScanArgs {
    /// Skip hidden entries
    #[arg(long)]
    no_hidden: bool,

    /// Descend into other filesystems
    #[arg(long)]
    cross_filesystems: bool,

    /// Glob matched against entry names; matching entries are skipped
    #[arg(short, long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// Scanner threads (0 = automatic)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum RulesFormat {
    /// `+ /path` and `- /path` lines
    #[default]
    Text,
    /// rsync filter list
    Rsync,
    Json,
}

/// One `+path` or `-path` command-line selection.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectionArg {
    selection: Selection,
    path: PathBuf,
}

impl FromStr for SelectionArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let selection = match s.chars().next() {
            Some('+') => Selection::Included,
            Some('-') => Selection::Excluded,
            _ => return Err(format!("selection must start with + or -: {s:?}")),
        };
        let path = s[1..].trim_start_matches('/');
        Ok(Self {
            selection,
            path: PathBuf::from(path),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Scan {
            path,
            depth,
            all,
            top,
            scan,
            selections,
        } => {
            let config = load_config(cli.config.as_deref(), path.as_deref(), &scan)?;
            run_scan(config, &selections, if all { None } else { Some(depth) }, top).await?;
        }
        Command::Rules {
            path,
            format,
            scan,
            selections,
        } => {
            let config = load_config(cli.config.as_deref(), path.as_deref(), &scan)?;
            run_rules(config, &selections, format).await?;
        }
        Command::Export {
            path,
            output,
            scan,
            selections,
        } => {
            let config = load_config(cli.config.as_deref(), path.as_deref(), &scan)?;
            run_export(config, &selections, output).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the scan configuration: file values first, then flags on top.
fn load_config(file: Option<&Path>, path: Option<&Path>, args: &ScanArgs) -> Result<ScanConfig> {
    let mut config = match file {
        Some(file) => ScanConfig::from_toml_file(file)
            .with_context(|| format!("Invalid config file {}", file.display()))?,
        None => ScanConfig::new("."),
    };

    if let Some(path) = path {
        config.root = path.to_path_buf();
    }
    config.root = config.root.canonicalize().context("Invalid path")?;
    if args.no_hidden {
        config.include_hidden = false;
    }
    if args.cross_filesystems {
        config.cross_filesystems = true;
    }
    config.ignore_patterns.extend(args.ignore.iter().cloned());
    if let Some(threads) = args.threads {
        config.threads = threads;
    }

    // Re-run validation over the merged values.
    config.ignore_matcher().context("Invalid ignore pattern")?;
    Ok(config)
}

/// Scan in the background, reporting progress until done. Ctrl-C cancels.
async fn scan_tree(config: ScanConfig) -> Result<Tree> {
    eprintln!("Scanning {}...", config.root.display());

    let cancel = CancellationToken::new();
    let mut rx = start_scan(config, cancel.clone());

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(ScanMessage::Progress(progress)) => {
                    eprint!(
                        "\r {} files, {} dirs, {} ",
                        progress.files_scanned,
                        progress.dirs_scanned,
                        format_size(progress.bytes_scanned)
                    );
                }
                Some(ScanMessage::Complete(result)) => {
                    eprint!("\r{:60}\r", "");
                    return result.context("Scan failed");
                }
                None => bail!("Scan task ended without a result"),
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                eprintln!("\nCancelling scan...");
                cancel.cancel();
            }
        }
    }
}

/// Scan and apply the command-line selections in order.
async fn select(config: ScanConfig, selections: &[SelectionArg]) -> Result<SelectionEngine> {
    let tree = scan_tree(config).await?;
    let mut engine = SelectionEngine::new(tree);

    for arg in selections {
        let changes = engine
            .set_selection(&arg.path, arg.selection)
            .with_context(|| format!("Cannot select {}", arg.path.display()))?;
        debug!(path = %arg.path.display(), changed = changes.len(), "selection applied");
    }

    Ok(engine)
}

/// Scan, then print the size tree.
async fn run_scan(
    config: ScanConfig,
    selections: &[SelectionArg],
    max_depth: Option<u32>,
    top_n: usize,
) -> Result<()> {
    let engine = select(config, selections).await?;
    let tree = engine.tree();

    println!();
    println!("{}", "─".repeat(72));
    println!(
        " {} - {}",
        tree.root_path.display(),
        format_size(tree.total_size())
    );
    println!(
        " {} files, {} directories, {} symlinks",
        tree.stats.total_files, tree.stats.total_dirs, tree.stats.total_symlinks
    );
    println!(" Selected: {}", format_size(tree.selected_size()));
    println!(" Scanned in {:.2}s", tree.scan_duration.as_secs_f64());
    println!("{}", "─".repeat(72));
    println!();

    print_node(
        tree,
        tree.root_id(),
        max_depth.unwrap_or(u32::MAX),
        top_n,
        tree.total_size(),
    );

    print_warnings(tree);
    Ok(())
}

/// Scan, apply selections and print the derived rules.
async fn run_rules(
    config: ScanConfig,
    selections: &[SelectionArg],
    format: RulesFormat,
) -> Result<()> {
    let engine = select(config, selections).await?;
    let tree = engine.tree();
    let rules = derive_rules(tree);

    match format {
        RulesFormat::Text => {
            for line in rules.to_lines() {
                println!("{line}");
            }
        }
        RulesFormat::Rsync => {
            let lines = rsync_filter(&rules).context("Cannot render rsync filter")?;
            println!("{}", lines.iter().join("\n"));
        }
        RulesFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
    }

    eprintln!(
        "{} rule(s), {} of {} selected",
        rules.len(),
        format_size(tree.selected_size()),
        format_size(tree.total_size())
    );
    print_warnings(tree);
    Ok(())
}

/// Export the tree with selection state to JSON.
async fn run_export(
    config: ScanConfig,
    selections: &[SelectionArg],
    output: Option<PathBuf>,
) -> Result<()> {
    let engine = select(config, selections).await?;
    let json = serde_json::to_string_pretty(engine.tree())?;

    match output {
        Some(output_path) => {
            std::fs::write(&output_path, json)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            eprintln!("Exported to {}", output_path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}

fn print_warnings(tree: &Tree) {
    if !tree.has_warnings() {
        return;
    }
    eprintln!();
    eprintln!("{} warning(s) during scan", tree.warnings.len());
    for warning in tree.warnings.iter().take(10) {
        eprintln!("  {}: {}", warning.path.display(), warning.message);
    }
    if tree.has_unknown_sizes() {
        eprintln!("  sizes marked ? are incomplete");
    }
}

/// Print a node and its largest children.
fn print_node(tree: &Tree, id: NodeId, max_depth: u32, top_n: usize, root_size: u64) {
    let node = tree.node(id);
    let depth = node.depth();
    let indent = "  ".repeat(depth as usize);
    let ratio = if root_size > 0 {
        node.aggregate_size() as f64 / root_size as f64 * 100.0
    } else {
        0.0
    };

    let name = if depth == 0 {
        tree.root_path.display().to_string()
    } else {
        node.name().to_string()
    };
    let dir_marker = if node.is_dir() { "/" } else { "" };
    let unknown = if node.size_unknown() { "?" } else { " " };

    println!(
        "{}{} {:<40} {:>10}{} {:>10} {:>5.1}% {}",
        indent,
        selection_marker(node.resolved()),
        truncate(&format!("{}{}", name, dir_marker), 40),
        format_size(node.aggregate_size()),
        unknown,
        format_size(node.own_size()),
        ratio,
        make_bar(ratio / 100.0, 10)
    );

    if node.is_dir() && depth < max_depth {
        let children = tree
            .children(id)
            .sorted_by_key(|child| std::cmp::Reverse(child.aggregate_size()))
            .collect_vec();
        let remaining = children.len().saturating_sub(top_n);

        for child in children.into_iter().take(top_n) {
            print_node(tree, child.id(), max_depth, top_n, root_size);
        }

        if remaining > 0 {
            let indent = "  ".repeat(depth as usize + 1);
            println!("{}    ... and {} more", indent, remaining);
        }
    }
}

fn selection_marker(state: Resolved) -> &'static str {
    match state {
        Resolved::Included => "[x]",
        Resolved::Excluded => "[ ]",
        Resolved::Mixed => "[~]",
    }
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}
