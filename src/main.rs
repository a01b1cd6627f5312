use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use satiety::config::{Config, DuplicatePolicy, EmbedderBackend, ParseErrorPolicy};
use satiety::diary::reader::read_diary_file;
use satiety::output::{table, terminal};
use satiety::pipeline::{self, Collaborators};

/// Satiety: per-food satiety coefficients from population food diaries.
///
/// Fits calorie goals against the foods eaten each person-day, first over
/// individual foods and then over semantic clusters of foods.
#[derive(Parser)]
#[command(name = "satiety", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full two-pass analysis on a diary file
    Analyze {
        /// Tab-separated diary file: person id, date, nutrition JSON, goals JSON
        input: PathBuf,

        /// Write the final coefficient table as TSV
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Write the full report (diagnostics, clusters, warnings) as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write the first-pass (per-food) coefficient table as TSV
        #[arg(long)]
        first_pass_output: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,

        /// Number of clusters for the second pass
        #[arg(long)]
        clusters: Option<usize>,

        /// Random seed for k-means initialisation
        #[arg(long)]
        seed: Option<u64>,

        /// Embedding backend: onnx or hashing
        #[arg(long)]
        embedder: Option<EmbedderBackend>,

        /// Stop after the first (per-food) pass
        #[arg(long)]
        skip_clustering: bool,

        /// Show only the N highest and N lowest coefficients
        #[arg(long)]
        top: Option<usize>,
    },

    /// Show dataset statistics (extraction and significance only, no solve)
    Stats {
        input: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Download the sentence embedding model (~90 MB)
    DownloadModel,
}

/// Settings shared by every command that reads a diary.
#[derive(clap::Args)]
struct Overrides {
    /// Minimum total calories for a food to keep its own column
    #[arg(long)]
    threshold: Option<f64>,

    /// Repeated food names in one day: overwrite or sum
    #[arg(long)]
    duplicates: Option<DuplicatePolicy>,

    /// Unparseable records: skip or abort
    #[arg(long)]
    on_parse_error: Option<ParseErrorPolicy>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(t) = self.threshold {
            config.threshold = t;
        }
        if let Some(d) = self.duplicates {
            config.duplicates = d;
        }
        if let Some(p) = self.on_parse_error {
            config.on_parse_error = p;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("satiety=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            output,
            json,
            first_pass_output,
            overrides,
            clusters,
            seed,
            embedder,
            skip_clustering,
            top,
        } => {
            let mut config = Config::load()?;
            overrides.apply(&mut config);
            if let Some(k) = clusters {
                config.clusters = k;
            }
            if let Some(s) = seed {
                config.kmeans.seed = s;
            }
            if let Some(e) = embedder {
                config.embedder = e;
            }
            config.validate()?;

            info!(input = %input.display(), "Reading diary file");
            let entries = read_diary_file(&input)?;

            let (collaborators, fallback) = if skip_clustering {
                (None, None)
            } else {
                let (c, w) = Collaborators::from_config(&config)?;
                (Some(c), w)
            };

            let mut report = pipeline::run(&entries, &config, collaborators.as_ref()).await?;
            if let Some(w) = fallback {
                report.warnings.insert(0, w);
            }

            terminal::display_stats(&report.stats);
            if report.second_pass.is_some() {
                terminal::display_coefficients(&report.first_pass, Some(top.unwrap_or(10)));
            }
            terminal::display_coefficients(report.final_table(), top);
            terminal::display_warnings(&report.warnings);

            if let Some(path) = first_pass_output {
                table::save_tsv(&report.first_pass, &path)?;
                println!("First-pass coefficients written to {}", path.display());
            }
            if let Some(path) = output {
                table::save_tsv(report.final_table(), &path)?;
                println!("Coefficients written to {}", path.display());
            }
            if let Some(path) = json {
                table::save_json(&report, &path)?;
                println!("Report written to {}", path.display());
            }
        }

        Commands::Stats { input, overrides } => {
            let mut config = Config::load()?;
            overrides.apply(&mut config);
            config.validate()?;

            let entries = read_diary_file(&input)?;
            let prepared = pipeline::prepare(&entries, &config)?;
            terminal::display_stats(&prepared.stats);
            terminal::display_warnings(&prepared.warnings);
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            println!("Downloading model to {}", config.model_dir.display());
            satiety::download::download_model(&config.model_dir).await?;
            println!("\n{}", "Model ready.".green());
        }
    }

    Ok(())
}
