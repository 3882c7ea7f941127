use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ncmconv::batch::{self, BatchEvent};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ncmconv", version, about = "NCM to MP3/FLAC converter")]
struct Cli {
    /// Enable debug logging (`RUST_LOG` takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decrypt NCM files to MP3/FLAC
    Dump {
        /// NCM files to convert
        files: Vec<PathBuf>,
        /// Process all NCM files in directory
        #[arg(short, long, value_name = "PATH")]
        directory: Option<PathBuf>,
        /// Recursive directory traversal (with -d)
        #[arg(short, long)]
        recursive: bool,
        /// Output directory
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Remove source file after successful conversion
        #[arg(short = 'm', long = "remove")]
        remove: bool,
        /// Number of files converted in parallel (default: one per CPU)
        #[arg(short, long, value_name = "N")]
        jobs: Option<usize>,
    },
    /// List NCM files in a directory
    Scan {
        /// Directory to search
        directory: PathBuf,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Command::Dump {
            files,
            directory,
            recursive,
            output,
            remove,
            jobs,
        } => cmd_dump(
            files,
            directory.as_deref(),
            recursive,
            output.as_deref(),
            remove,
            jobs,
        ),
        Command::Scan {
            directory,
            recursive,
        } => cmd_scan(&directory, recursive),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ── dump ──

fn cmd_dump(
    mut files: Vec<PathBuf>,
    directory: Option<&Path>,
    recursive: bool,
    output: Option<&Path>,
    remove: bool,
    jobs: Option<usize>,
) -> Result<()> {
    if let Some(dir) = directory {
        files.extend(
            ncmconv::discovery::scan(dir, recursive, |p| {
                debug!("scanning {} ({:.0}%)", p.current_dir.display(), p.fraction * 100.0);
            })
            .with_context(|| format!("failed to scan {}", dir.display()))?,
        );
    }

    if files.is_empty() {
        eprintln!("No NCM files specified. Use --help for usage.");
        std::process::exit(1);
    }

    if let Some(jobs) = jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("failed to configure worker threads")?;
    }
    if let Some(dir) = output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let report = batch::convert_all(&files, output, |event, progress| {
        let pct = progress.fraction() * 100.0;
        match event {
            BatchEvent::Started { .. } => {}
            BatchEvent::Converted { input, output } => {
                println!("[{pct:>3.0}%] {} -> {}", input.display(), output.display());
            }
            BatchEvent::Failed { input, error } => {
                eprintln!("[{pct:>3.0}%] error: {}: {error}", input.display());
            }
        }
    });

    if remove {
        for (input, _) in &report.converted {
            if let Err(e) = std::fs::remove_file(input) {
                eprintln!("warning: failed to remove {}: {e}", input.display());
            }
        }
    }

    println!(
        "Done: {} converted, {} failed.",
        report.converted.len(),
        report.failed.len()
    );
    if !report.failed.is_empty() {
        bail!("{} file(s) could not be converted", report.failed.len());
    }
    Ok(())
}

// ── scan ──

fn cmd_scan(directory: &Path, recursive: bool) -> Result<()> {
    let files = ncmconv::discovery::scan(directory, recursive, |p| {
        eprintln!(
            "[{:>3.0}%] {}",
            p.fraction * 100.0,
            p.current_dir.display()
        );
    })
    .with_context(|| format!("failed to scan {}", directory.display()))?;

    for file in &files {
        println!("{}", file.display());
    }
    eprintln!("Found {} NCM file(s).", files.len());
    Ok(())
}
