//! tidyscan - concurrent disk usage, size estimation and duplicate hashing.
//!
//! Usage:
//!   tidyscan scan [PATH]...         List files matching a scan preset
//!   tidyscan size [PATH]            Exact (or sampled) size of a tree
//!   tidyscan hash [PATH]...         MD5 digests of files
//!   tidyscan duplicates [PATH]...   Find duplicate files
//!   tidyscan --help                 Show help

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing::Level;

use tidyscan_analyze::{DuplicateConfig, DuplicateFinder, HashComputer};
use tidyscan_core::{DeliveryThread, ProgressNotifier, ProgressSnapshot, UpdateThrottle};
use tidyscan_scan::{DirectoryScanner, ScanConfiguration, ScanOutput, ScannedFile, SizeComputer};

#[derive(Parser)]
#[command(
    name = "tidyscan",
    version,
    about = "Concurrent disk usage, size estimation and duplicate hashing",
    long_about = "tidyscan walks directory trees in parallel to find large or junk files, \
                  measures tree sizes exactly or by sampling, and hashes file contents \
                  with bounded concurrency to find duplicates."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Do not draw progress on stderr
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan roots and list the files that pass the filters
    Scan {
        /// Roots to scan
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        filters: ScanArgs,

        /// Number of largest files to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Compute the total size of a file or directory
    Size {
        /// Path to measure
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Estimate from a random sample of files at this rate (0, 1]
        #[arg(short, long)]
        estimate: Option<f64>,
    },

    /// Print MD5 digests of files (directories are expanded)
    Hash {
        /// Files or directories to hash
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Maximum files read at once
        #[arg(short = 'j', long, default_value = "4")]
        concurrency: usize,
    },

    /// Find duplicate files
    Duplicates {
        /// Roots to scan
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        filters: ScanArgs,

        /// Maximum files read at once while hashing
        #[arg(short = 'j', long, default_value = "4")]
        concurrency: usize,

        /// Maximum number of duplicate groups to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Filters shared by every command that scans.
#[derive(Args)]
struct ScanArgs {
    /// Starting policy
    #[arg(short, long, default_value = "junk")]
    preset: Preset,

    /// Minimum file size (e.g., "1KB", "50MB"); overrides the preset
    #[arg(short, long)]
    min_size: Option<String>,

    /// Root-relative prefix to skip (repeatable)
    #[arg(short = 'x', long = "exclude")]
    excludes: Vec<String>,

    /// Include hidden files even if the preset skips them
    #[arg(long)]
    hidden: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    /// Every file, hidden ones included
    Junk,
    /// Files of 50 MiB or more outside sensitive system folders
    Large,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);
    let progress = !cli.quiet;

    match cli.command {
        Command::Scan {
            paths,
            filters,
            top,
            format,
        } => run_scan(paths, &filters, top, format, progress).await,
        Command::Size { path, estimate } => run_size(path, estimate).await,
        Command::Hash { paths, concurrency } => run_hash(paths, concurrency, progress).await,
        Command::Duplicates {
            paths,
            filters,
            concurrency,
            top,
            format,
        } => run_duplicates(paths, &filters, concurrency, top, format, progress).await,
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the scan configuration from a preset plus command-line overrides.
fn build_config(args: &ScanArgs) -> Result<ScanConfiguration> {
    let preset = match args.preset {
        Preset::Junk => ScanConfiguration::junk_scan(),
        Preset::Large => ScanConfiguration::large_file_scan(),
    };

    let mut builder = ScanConfiguration::builder();
    builder
        .max_concurrency(preset.max_concurrency())
        .notify_interval(preset.notify_interval())
        .min_file_size(preset.min_file_size())
        .include_hidden(preset.include_hidden() || args.hidden)
        .excluded_prefixes(preset.excluded_prefixes().clone());

    if let Some(min_size) = &args.min_size {
        builder.min_file_size(parse_size(min_size)?);
    }
    for prefix in &args.excludes {
        builder.exclude(prefix.as_str());
    }

    builder.build().context("Invalid scan options")
}

/// Progress line on stderr, redrawn at most every 100ms from a delivery thread.
fn progress_notifier(label: &'static str) -> Result<ProgressNotifier> {
    let delivery = DeliveryThread::spawn("tidyscan-progress").context("Cannot start progress thread")?;
    let throttle = Arc::new(UpdateThrottle::new(UpdateThrottle::DEFAULT_INTERVAL, delivery));
    Ok(ProgressNotifier::new(throttle, move |snapshot: ProgressSnapshot| {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\r\x1b[2K{label} {}/{} ({:.0}%)  {}",
            snapshot.completed_units,
            snapshot.total_units,
            snapshot.fraction() * 100.0,
            truncate(&snapshot.current_path.display().to_string(), 60)
        );
        let _ = stderr.flush();
    }))
}

fn clear_progress(enabled: bool) {
    if enabled {
        eprint!("\r\x1b[2K");
    }
}

async fn scan_roots(
    paths: Vec<PathBuf>,
    config: ScanConfiguration,
    progress: bool,
) -> Result<ScanOutput<ScannedFile>> {
    let mut scanner = DirectoryScanner::new(config);
    if progress {
        scanner = scanner.with_notifier(progress_notifier("Scanning roots")?);
    }

    let output = tokio::task::spawn_blocking(move || scanner.scan_files(paths))
        .await
        .context("Scan worker failed")?
        .context("Scan failed")?;
    clear_progress(progress);
    Ok(output)
}

/// Run a scan and list the largest matches.
async fn run_scan(
    paths: Vec<PathBuf>,
    filters: &ScanArgs,
    top_n: usize,
    format: OutputFormat,
    progress: bool,
) -> Result<()> {
    let config = build_config(filters)?;
    let mut output = scan_roots(paths, config, progress).await?;
    output.items.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(
                " {} files, {} total ({} examined, {} entries visited)",
                output.items.len(),
                format_size(output.total_size),
                output.processed_count,
                output.entries_visited
            );
            println!(" Scanned in {:.2}s", output.duration.as_secs_f64());
            println!("{}", "─".repeat(70));
            println!();

            for file in output.items.iter().take(top_n) {
                println!(" {:>10}  {}", format_size(file.size), file.path.display());
            }
            if output.items.len() > top_n {
                println!(" ... and {} more", output.items.len() - top_n);
            }
            if output.skipped_entries > 0 {
                println!();
                println!("{} unreadable entries skipped", output.skipped_entries);
            }
        }
        OutputFormat::Json => {
            output.items.truncate(top_n);
            let report = serde_json::json!({
                "files": output.items,
                "total_size": output.total_size,
                "processed_count": output.processed_count,
                "entries_visited": output.entries_visited,
                "skipped_entries": output.skipped_entries,
                "duration_ms": output.duration.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Print the exact or estimated size of a tree.
async fn run_size(path: PathBuf, estimate: Option<f64>) -> Result<()> {
    let computer = SizeComputer::new();
    let (bytes, label) = tokio::task::spawn_blocking(move || match estimate {
        Some(rate) => computer
            .estimate_size(&path, rate)
            .map(|bytes| (bytes, format!("~{}", path.display()))),
        None => Ok((computer.exact_size(&path), path.display().to_string())),
    })
    .await
    .context("Size worker failed")??;

    println!("{}\t{}", format_size(bytes), label);
    Ok(())
}

/// Print MD5 digests in `md5sum` layout.
async fn run_hash(paths: Vec<PathBuf>, concurrency: usize, progress: bool) -> Result<()> {
    let (files, dirs): (Vec<PathBuf>, Vec<PathBuf>) = paths.into_iter().partition(|p| !p.is_dir());
    let mut targets = files;
    if !dirs.is_empty() {
        let output = scan_roots(dirs, ScanConfiguration::junk_scan(), progress).await?;
        targets.extend(output.items.into_iter().map(|f| f.path));
    }

    let mut computer = HashComputer::new(concurrency)?;
    if progress {
        computer = computer.with_notifier(progress_notifier("Hashing files")?);
    }
    let hashes = computer.compute_hashes(targets.iter().cloned()).await;
    // Joins the progress thread so nothing redraws after the clear.
    drop(computer);
    clear_progress(progress);

    let mut missing = 0usize;
    for path in &targets {
        match hashes.get(path) {
            Some(digest) => println!("{digest}  {}", path.display()),
            None => missing += 1,
        }
    }
    if missing > 0 {
        bail!("{missing} file(s) could not be read");
    }
    Ok(())
}

/// Scan roots and report groups of identical files.
async fn run_duplicates(
    paths: Vec<PathBuf>,
    filters: &ScanArgs,
    concurrency: usize,
    top_n: usize,
    format: OutputFormat,
    progress: bool,
) -> Result<()> {
    let config = build_config(filters)?;
    let min_size = config.min_file_size().max(1);
    let output = scan_roots(paths, config, progress).await?;

    let dup_config = DuplicateConfig::builder()
        .min_size(min_size)
        .max_concurrency(concurrency)
        .max_groups(top_n)
        .build()
        .context("Invalid duplicate options")?;
    let report = DuplicateFinder::with_config(dup_config)
        .find_duplicates(output.items.into_iter().map(|f| (f.path, f.size)))
        .await?;

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(70));
            println!(" Duplicate File Report");
            println!("{}", "─".repeat(70));
            println!();

            if !report.has_duplicates() {
                println!(" No duplicate files found.");
            } else {
                println!(
                    " Found {} duplicate groups ({} files)",
                    report.group_count,
                    report.total_duplicate_files()
                );
                println!(
                    " Total wasted space: {}",
                    format_size(report.total_wasted_space)
                );
                println!();

                for (i, group) in report.groups.iter().enumerate() {
                    println!(
                        " Group {} ({} files, {} each, {} wasted)",
                        i + 1,
                        group.count(),
                        format_size(group.size),
                        format_size(group.wasted_bytes)
                    );
                    for path in &group.paths {
                        println!("   {}", path.display());
                    }
                    println!();
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Keep the tail of `s`, which is the informative end of a path.
fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(count - (max_len - 1)).collect();
        format!("…{tail}")
    }
}

/// Parse a size string (e.g., "512", "1KB", "10M", "1.5GB").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(digits_end);

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        other => bail!("Unknown size unit {other:?} in {s:?}"),
    };
    let num: f64 = num
        .parse()
        .with_context(|| format!("Invalid size {s:?}"))?;

    Ok((num * multiplier as f64) as u64)
}
