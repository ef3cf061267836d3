use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use gallery_core::{
    embed_notice_batch, generate_manifest, list_image_files, ExiftoolEmbedder, GalleryConfig,
    Manifest, ProgressObserver,
};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser)]
#[command(name = "galleryctl", version, about = "Batch tools for the LSA gallery site")]
struct Cli {
    /// Gallery site root (contains img/ and data/images.json)
    #[arg(long, short)]
    root: Option<PathBuf>,

    /// Suppress warnings
    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan img/ and rewrite data/images.json, preserving curated fields
    Manifest,
    /// Write the license notice into image metadata via exiftool
    Embed {
        /// Override the metadata tool executable
        #[arg(long, default_value = "exiftool")]
        tool: String,
    },
    /// Show the manifest record for a file or public id
    Info {
        name: String,
        /// Print the raw record JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion script
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.root.clone() {
        Some(root) => GalleryConfig::with_root(root),
        None => GalleryConfig::default(),
    };

    match cli.command {
        Commands::Manifest => manifest_command(&config, cli.quiet),
        Commands::Embed { tool } => embed_command(&config, tool, cli.quiet),
        Commands::Info { name, json } => info_command(&config, &name, json),
        Commands::Completion { shell } => completion_command(shell),
    }
}

struct ScanProgress {
    pb: ProgressBar,
}

impl ProgressObserver for ScanProgress {
    fn inc(&self, delta: u64) {
        self.pb.inc(delta);
    }
}

fn manifest_command(config: &GalleryConfig, quiet: bool) -> Result<()> {
    let img_dir = config.img_dir();
    let manifest_path = config.manifest_path();
    let total = list_image_files(&img_dir)
        .with_context(|| format!("cannot list {}", img_dir.display()))?
        .len();

    let show_progress = !quiet && std::io::stderr().is_terminal();
    let progress = if show_progress {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb.set_message("hashing");
        Some(pb)
    } else {
        None
    };

    let observer = progress.as_ref().map(|pb| ScanProgress { pb: pb.clone() });
    let report = generate_manifest(
        &img_dir,
        &manifest_path,
        observer.as_ref().map(|o| o as &dyn ProgressObserver),
    )
    .context("manifest generation failed")?;
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    if !quiet {
        for warning in &report.warnings {
            eprintln!("warning: {}: {}", warning.path.display(), warning.message);
        }
    }
    println!(
        "Wrote {} records to {}",
        report.manifest.len(),
        manifest_path.display()
    );
    Ok(())
}

fn embed_command(config: &GalleryConfig, tool: String, quiet: bool) -> Result<()> {
    let embedder = ExiftoolEmbedder::with_program(tool);
    let report = embed_notice_batch(&embedder, &config.img_dir())
        .context("license embedding failed")?;

    for path in &report.embedded {
        println!("Embedded license into {}", path.display());
    }
    if !quiet {
        for warning in &report.warnings {
            eprintln!("warning: skipped {}: {}", warning.path.display(), warning.message);
        }
    }
    println!(
        "Embedded {} file(s), skipped {}.",
        report.embedded.len(),
        report.warnings.len()
    );
    Ok(())
}

fn info_command(config: &GalleryConfig, name: &str, json: bool) -> Result<()> {
    let manifest_path = config.manifest_path();
    let manifest = Manifest::load(&manifest_path)
        .with_context(|| format!("cannot load {}", manifest_path.display()))?;

    let record = manifest
        .get(name)
        .or_else(|| manifest.find_by_id(name))
        .ok_or_else(|| anyhow!("no record for {name}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("File: {}", record.file);
    println!("Id: {}", record.id());
    println!("Src: {}", record.src);
    println!("Title: {}", record.display_title());
    match (record.width, record.height) {
        (Some(width), Some(height)) => println!("Dimensions: {width}x{height}"),
        _ => println!("Dimensions: (unknown)"),
    }
    println!("Bytes: {}", record.bytes);
    println!(
        "Mime: {}",
        if record.mime.is_empty() {
            "(unknown)"
        } else {
            &record.mime
        }
    );
    if record.tags.is_empty() {
        println!("Tags: (none)");
    } else {
        println!("Tags: {}", record.tags.join(" "));
    }
    println!(
        "Creator: {}",
        if record.creator.is_empty() {
            "(none)"
        } else {
            &record.creator
        }
    );
    println!("Added: {}", format_added(record.added));
    println!("Sha256: {}", record.sha256);
    if !record.description.is_empty() {
        println!("Description: {}", record.description);
    }
    Ok(())
}

fn completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}

/// `added` stamps are epoch milliseconds from the generator, but hand-edited
/// manifests sometimes carry plain seconds.
fn format_added(added: i64) -> String {
    if added == 0 {
        return "(unknown)".to_string();
    }
    let (seconds, nanos) = if added.abs() >= 1_000_000_000_000 {
        let seconds = added.div_euclid(1000);
        let millis = added.rem_euclid(1000) as u32;
        (seconds, millis * 1_000_000)
    } else {
        (added, 0)
    };
    match Utc.timestamp_opt(seconds, nanos).single() {
        Some(utc) => format_local_datetime(utc.with_timezone(&Local)),
        None => added.to_string(),
    }
}

fn format_local_datetime(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S %:z").to_string()
}
