//! `unbake analyze`: load an archive, reconstruct, and write the result.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;

use anyhow::{Context, Result};
use unbake::ImageDescription;
use unbake_image::Selector;

/// Arguments for `unbake analyze`.
///
/// Usage: `unbake analyze [OPTIONS] ARCHIVE`
#[derive(clap::Args)]
pub struct AnalyzeArgs {
    /// Image archive produced by `docker save` (plain or gzip-compressed).
    pub archive: PathBuf,

    /// Write output to this file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Output format.
    #[arg(short = 'f', long, value_enum, default_value_t, ignore_case = true)]
    pub format: OutputFormat,

    /// Print an image summary to stderr and enable info logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Image to analyze when the archive holds several: index or repo tag.
    #[arg(long, default_value = "0")]
    pub image: Selector,
}

/// What `analyze` writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Reconstructed Dockerfile.
    #[default]
    Dockerfile,
    /// The loaded image description as pretty-printed JSON.
    Json,
}

/// Runs `unbake analyze`.
///
/// Everything is rendered in memory first; the output file is only created
/// once the archive has loaded successfully.
pub fn run(args: &AnalyzeArgs) -> Result<()> {
    let image = unbake_image::open(&args.archive, &args.image)
        .with_context(|| format!("failed to analyze {}", args.archive.display()))?;

    let rendered = render(&image, args.format)?;

    if args.verbose {
        eprint!("{}", summary(&image));
    }

    match &args.output {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if args.verbose {
                eprintln!("Output written to: {}", path.display());
            }
        }
        None => io::stdout()
            .lock()
            .write_all(rendered.as_bytes())
            .context("failed to write to stdout")?,
    }
    Ok(())
}

/// Renders the image in the requested format.
fn render(image: &ImageDescription, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Dockerfile => unbake::to_dockerfile(&unbake::reconstruct(image)),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(image)?;
            json.push('\n');
            json
        }
    })
}

/// Human-readable overview printed with `--verbose`.
fn summary(image: &ImageDescription) -> String {
    let mut out = String::from("Image Information:\n==================\n");
    let _ = writeln!(out, "ID: {}", image.id);
    if !image.repo_tags.is_empty() {
        let _ = writeln!(out, "Repository Tags: {}", image.repo_tags.join(", "));
    }
    if let Some(created) = &image.created {
        let _ = writeln!(out, "Created: {created}");
    }
    let _ = writeln!(
        out,
        "Architecture: {}, OS: {}",
        image.architecture, image.os
    );
    if !image.config.exposed_ports.is_empty() {
        let ports: Vec<&str> = image.config.exposed_ports.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Exposed Ports: {}", ports.join(", "));
    }
    if !image.config.env.is_empty() {
        out.push_str("\nEnvironment Variables:\n");
        for var in &image.config.env {
            let _ = writeln!(out, "  {var}");
        }
    }
    let _ = writeln!(out, "\nLayers: {}", image.layers.len());
    let _ = writeln!(out, "History Entries: {}", image.history.len());
    out.push_str("==================\n");
    out
}
