use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use transcript_mapper::{
    BatchOptions, RunReport, Side, Unit, UnitStatus, generate_artifact, read_manifest, run_batch,
};

/// Compact transcripts without breaking the mapping tables that point into them
#[derive(Parser, Debug)]
#[command(name = "transcript-mapper")]
#[command(version = "0.1.0")]
#[command(about = "Line-removal remapping and overlap rendering for document mappings", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove blank lines from one document and remap its mapping table
    Compact {
        /// Document A
        #[arg(short, long)]
        source: PathBuf,

        /// Document B
        #[arg(short, long)]
        transcript: PathBuf,

        /// Markdown mapping table
        #[arg(short, long)]
        mapping: PathBuf,

        /// Which document to compact
        #[arg(long, default_value = "target")]
        side: Side,

        /// Verify everything but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Output structured JSON instead of human-readable
        #[arg(short, long)]
        json: bool,

        /// Write the report to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compact every unit listed in a JSON manifest
    Batch {
        /// JSON list of {source, transcript, mapping, side}
        #[arg(short, long)]
        manifest: PathBuf,

        /// Verify everything but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Output structured JSON instead of human-readable
        #[arg(short, long)]
        json: bool,

        /// Write the report to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a self-contained HTML viewer for a document pair
    Render {
        /// Document A
        #[arg(short, long)]
        source: PathBuf,

        /// Document B
        #[arg(short, long)]
        transcript: PathBuf,

        /// Markdown mapping table
        #[arg(short, long)]
        mapping: PathBuf,

        /// HTML file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Page title
        #[arg(long)]
        title: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Compact { source, transcript, mapping, side, dry_run, json, output } => {
            let unit = Unit { source, transcript, mapping, side };
            let report = run_batch(&[unit], BatchOptions { dry_run });
            output_report(&report, json, output.as_ref());
            if !report.is_complete_success() {
                std::process::exit(1);
            }
        }
        Command::Batch { manifest, dry_run, json, output } => {
            let units = match read_manifest(&manifest) {
                Ok(units) => units,
                Err(e) => {
                    eprintln!("Error reading manifest '{}': {}", manifest.display(), e);
                    std::process::exit(1);
                }
            };
            let report = run_batch(&units, BatchOptions { dry_run });
            output_report(&report, json, output.as_ref());
            if !report.is_complete_success() {
                std::process::exit(1);
            }
        }
        Command::Render { source, transcript, mapping, output, title } => {
            match generate_artifact(&source, &transcript, &mapping, &output, title.as_deref()) {
                Ok(groups) => println!("Wrote {} ({} mapping(s))", output.display(), groups),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Format and output the run report
fn output_report(report: &RunReport, json_mode: bool, output_path: Option<&PathBuf>) {
    let output = if json_mode {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| {
            r#"{"error": "Failed to serialize report"}"#.to_string()
        })
    } else {
        let mut lines = vec![format!("Run {}", report.run_id)];
        for unit in &report.units {
            let line = match unit.status {
                UnitStatus::Committed => format!(
                    "committed {}: removed {} line(s), {} span(s) verified",
                    unit.document,
                    unit.removed_lines.len(),
                    unit.spans_checked
                ),
                UnitStatus::Verified => format!(
                    "verified {} (dry run): would remove {} line(s), {} span(s) verified",
                    unit.document,
                    unit.removed_lines.len(),
                    unit.spans_checked
                ),
                UnitStatus::Unchanged => format!("unchanged {}: no blank lines", unit.document),
                UnitStatus::Aborted => format!(
                    "aborted {}: {}",
                    unit.document,
                    unit.error.as_deref().unwrap_or("Unknown error")
                ),
            };
            lines.push(line);
        }
        lines.push(format!("{} committed, {} aborted", report.committed, report.aborted));
        lines.join("\n")
    };

    if let Some(path) = output_path {
        if let Err(e) = fs::write(path, &output) {
            eprintln!("Failed to write output to '{}': {}", path.display(), e);
            std::process::exit(1);
        }
    } else {
        println!("{}", output);
    }
}
