//! Command-line launcher
//!
//! ```text
//! species-dl single <species> [--latin NAME] [--images N] [--folder DIR]
//! species-dl batch [--csv PATH] [--start-row N] [--max-species N]
//!                  [--priority HIGH|MEDIUM|LOW] [--images N] [--folder DIR]
//! species-dl                 (prompts for a species and an image count)
//! ```
//!
//! Every mode accepts `--config FILE` (JSON). Ctrl+C stops after the current
//! candidate and still writes the run report.

use species_dl::{
    BatchController, Config, Priority, PriorityFilter, RunReport, SessionStatus, SpeciesQueue,
    cancel_on_signal,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const DEFAULT_CATALOG: &str = "fish_scraping_list_updated.csv";

const USAGE: &str = "\
Usage:
  species-dl single <species> [--latin NAME] [--images N] [--folder DIR] [--config FILE]
  species-dl batch [--csv PATH] [--start-row N] [--max-species N]
                   [--priority HIGH|MEDIUM|LOW] [--images N] [--folder DIR] [--config FILE]
  species-dl       interactive single-species mode

Set RUST_LOG to change the log level (default: info).";

type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

enum Mode {
    Single {
        species: String,
        latin: Option<String>,
    },
    Batch {
        csv: PathBuf,
        start_row: usize,
        max_species: Option<usize>,
        priority: PriorityFilter,
    },
    Interactive,
}

struct Args {
    mode: Mode,
    images: Option<usize>,
    folder: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args(raw: Vec<String>) -> CliResult<Args> {
    let mut args = raw.into_iter();
    let mut parsed = Args {
        mode: Mode::Interactive,
        images: None,
        folder: None,
        config: None,
    };

    match args.next().as_deref() {
        None => return Ok(parsed),
        Some("-h" | "--help") => {
            println!("{}", USAGE);
            std::process::exit(0);
        }
        Some("single") => {
            parsed.mode = Mode::Single {
                species: String::new(),
                latin: None,
            }
        }
        Some("batch") => {
            parsed.mode = Mode::Batch {
                csv: PathBuf::from(DEFAULT_CATALOG),
                start_row: 0,
                max_species: None,
                priority: PriorityFilter::All,
            }
        }
        Some(other) => return Err(format!("Unknown mode: {}\n\n{}", other, USAGE).into()),
    }

    while let Some(a) = args.next() {
        let mut value = |name: &str| args.next().ok_or(format!("Missing value for {}", name));
        match (a.as_str(), &mut parsed.mode) {
            ("--images", _) => parsed.images = Some(value("--images")?.parse()?),
            ("--folder", _) => parsed.folder = Some(PathBuf::from(value("--folder")?)),
            ("--config", _) => parsed.config = Some(PathBuf::from(value("--config")?)),
            ("--latin", Mode::Single { latin, .. }) => *latin = Some(value("--latin")?),
            ("--csv", Mode::Batch { csv, .. }) => *csv = PathBuf::from(value("--csv")?),
            ("--start-row", Mode::Batch { start_row, .. }) => {
                *start_row = value("--start-row")?.parse()?
            }
            ("--max-species", Mode::Batch { max_species, .. }) => {
                *max_species = Some(value("--max-species")?.parse()?)
            }
            ("--priority", Mode::Batch { priority, .. }) => {
                *priority = PriorityFilter::Tier(value("--priority")?.parse::<Priority>()?)
            }
            ("-h" | "--help", _) => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            (positional, Mode::Single { species, .. })
                if !positional.starts_with("--") && species.is_empty() =>
            {
                *species = positional.to_string()
            }
            _ => return Err(format!("Unknown arg: {}", a).into()),
        }
    }

    if let Mode::Single { species, .. } = &parsed.mode
        && species.trim().is_empty()
    {
        return Err(format!("Missing species name\n\n{}", USAGE).into());
    }
    Ok(parsed)
}

fn prompt(question: &str) -> CliResult<String> {
    print!("{}", question);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Ask for the species and count when started without arguments
fn interactive(default_images: usize) -> CliResult<(String, Option<String>, usize)> {
    let species = loop {
        let answer = prompt("Species name: ")?;
        if !answer.is_empty() {
            break answer;
        }
        println!("Please enter a species name.");
    };
    let latin = Some(prompt("Scientific name (optional): ")?).filter(|s| !s.is_empty());
    let images = prompt(&format!("Images to collect [{}]: ", default_images))?
        .parse()
        .unwrap_or(default_images);
    Ok((species, latin, images))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_report(report: &RunReport) {
    println!("\n{}", "=".repeat(50));
    println!("{}", report);
    for summary in report.species.iter() {
        let marker = match summary.status {
            SessionStatus::Satisfied => "ok",
            SessionStatus::Partial => "partial",
            _ => "failed",
        };
        println!(
            "  [{:>7}] {} {}/{} -> {}",
            marker,
            summary.name,
            summary.total(),
            summary.target,
            summary.directory.display()
        );
    }
    println!("{}", "=".repeat(50));
}

async fn run(args: Args) -> CliResult<RunReport> {
    let config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let folder = args
        .folder
        .clone()
        .unwrap_or_else(|| config.batch.output_root.clone());
    let default_images = config.batch.images_per_species;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));
    let controller = BatchController::with_standard_sources(config);

    let report = match args.mode {
        Mode::Single { species, latin } => {
            let images = args.images.unwrap_or(default_images);
            controller
                .run_single(&species, latin.as_deref(), images, &folder, &cancel)
                .await?
        }
        Mode::Interactive => {
            let (species, latin, images) = interactive(args.images.unwrap_or(default_images))?;
            controller
                .run_single(&species, latin.as_deref(), images, &folder, &cancel)
                .await?
        }
        Mode::Batch {
            csv,
            start_row,
            max_species,
            priority,
        } => {
            let mut queue = SpeciesQueue::load(&csv)?.filter(priority).skip(start_row);
            if let Some(max) = max_species {
                queue = queue.limit(max);
            }
            println!(
                "Catalog: {} | species: {} | images per species: {} | output: {}",
                csv.display(),
                queue.len(),
                args.images.unwrap_or(default_images),
                folder.display()
            );
            controller
                .run(queue, args.images.unwrap_or(default_images), &folder, &cancel)
                .await?
        }
    };
    cancel.cancel();
    Ok(report)
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = match parse_args(std::env::args().skip(1).collect()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match run(args).await {
        Ok(report) => print_report(&report),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
