use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagewright::{Config, Metadata};
use std::path::PathBuf;

mod edit;
mod shell;
mod tools;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON configuration file, overridden by PAGEWRIGHT_* variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a list of edits to a document and save the result
    Edit {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = edit::SaveMode::KeepAll)]
        mode: edit::SaveMode,
        /// Save only these pages, in this order (e.g. "2,0,1:3")
        #[arg(long, value_delimiter = ',', conflicts_with = "mode")]
        pages: Option<Vec<String>>,
        /// JSON file holding an array of edits
        #[arg(long)]
        script: Option<PathBuf>,
        /// A single JSON edit, applied after the script
        #[arg(long = "edit")]
        edits: Vec<String>,
    },
    /// Edit a document interactively
    Shell { input: PathBuf },
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Split a document by page ranges ("1-3,5") or into equal parts
    Split {
        input: PathBuf,
        #[arg(long, conflicts_with = "parts", required_unless_present = "parts")]
        ranges: Option<String>,
        #[arg(long)]
        parts: Option<usize>,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        /// Output files are named <name>_01.pdf, <name>_02.pdf...
        #[arg(long)]
        name: Option<String>,
    },
    Protect {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        owner_password: Option<String>,
    },
    Unprotect {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    Compress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the title, author and other information entries as JSON
    Metadata { input: PathBuf },
    /// Change information entries, keeping the ones not given
    SetMetadata {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        keywords: Option<String>,
        #[arg(long)]
        creator: Option<String>,
        #[arg(long)]
        producer: Option<String>,
    },
    /// Render a small preview of every page
    Thumbnails {
        input: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        /// Print the previews as JSON instead of writing files
        #[arg(long)]
        json: bool,
    },
    ExportImages {
        input: PathBuf,
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        /// 1-based pages and ranges, all pages when omitted
        #[arg(long)]
        pages: Option<String>,
        #[arg(long, default_value = "png")]
        format: pagewright::ImageFormat,
        #[arg(long)]
        dpi: Option<u32>,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Edit {
            input,
            output,
            mode,
            pages,
            script,
            edits,
        } => edit::run(config, &input, &output, mode, pages, script, &edits)?,
        Commands::Shell { input } => shell::run(config, &input)?,
        Commands::Merge { inputs, output } => tools::merge(&config, &inputs, &output)?,
        Commands::Split {
            input,
            ranges,
            parts,
            output_dir,
            name,
        } => tools::split(&config, &input, ranges, parts, &output_dir, name)?,
        Commands::Protect {
            input,
            output,
            password,
            owner_password,
        } => tools::protect(&config, &input, &output, password, owner_password)?,
        Commands::Unprotect {
            input,
            output,
            password,
        } => tools::unprotect(&config, &input, &output, password)?,
        Commands::Compress { input, output } => tools::compress(&config, &input, &output)?,
        Commands::Metadata { input } => tools::metadata(&config, &input)?,
        Commands::SetMetadata {
            input,
            output,
            title,
            author,
            subject,
            keywords,
            creator,
            producer,
        } => {
            let update = Metadata {
                title,
                author,
                subject,
                keywords,
                creator,
                producer,
            };
            tools::set_metadata(&config, &input, &output, &update)?
        }
        Commands::Thumbnails {
            input,
            output_dir,
            json,
        } => tools::thumbnails(&config, &input, &output_dir, json)?,
        Commands::ExportImages {
            input,
            output_dir,
            pages,
            format,
            dpi,
        } => tools::export_images(&config, &input, &output_dir, pages, format, dpi)?,
    }
    Ok(())
}
