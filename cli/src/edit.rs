use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use colored::*;
use pagewright::{Config, Edit, EditOutcome, PageId, PdfAdapter, PlanMode, Session, SessionEvent};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SaveMode {
    KeepAll,
    DeleteSelected,
    KeepSelected,
    /// Every page, with compression forced on
    Compress,
}

impl SaveMode {
    pub fn plan_mode(&self) -> PlanMode {
        match self {
            SaveMode::KeepAll | SaveMode::Compress => PlanMode::KeepAll,
            SaveMode::DeleteSelected => PlanMode::DeleteSelected,
            SaveMode::KeepSelected => PlanMode::KeepOnlySelected,
        }
    }

    pub fn compresses(&self) -> bool {
        *self == SaveMode::Compress
    }
}

pub fn parse_page_ids(values: &[String]) -> Result<Vec<PageId>> {
    values
        .iter()
        .map(|value| value.parse::<PageId>().map_err(|e| anyhow!(e)))
        .collect()
}

/// Reads the script file, if any, followed by the edits given one by one.
pub fn load_edits(script: Option<&Path>, edits: &[String]) -> Result<Vec<Edit>> {
    let mut loaded: Vec<Edit> = match script {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid edit script {}", path.display()))?
        }
        None => Vec::new(),
    };

    for edit in edits.iter() {
        let edit: Edit =
            serde_json::from_str(edit).with_context(|| format!("Invalid edit: {}", edit))?;
        loaded.push(edit);
    }

    Ok(loaded)
}

pub fn run(
    mut config: Config,
    input: &Path,
    output: &Path,
    mode: SaveMode,
    pages: Option<Vec<String>>,
    script: Option<PathBuf>,
    edits: &[String],
) -> Result<()> {
    let edits = load_edits(script.as_deref(), edits)?;
    let plan_mode = match pages {
        Some(pages) => PlanMode::ExplicitList(parse_page_ids(&pages)?),
        None => mode.plan_mode(),
    };

    // Nobody looks at previews here.
    config.render_thumbnails = false;

    let mut session = Session::new(PdfAdapter::from_config(&config), config)?;
    let page_count = session
        .open_blocking(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    println!("Opened {} ({} pages)", input.display(), page_count);

    for edit in edits.iter() {
        match session.apply(edit)? {
            EditOutcome::AtBoundary => {
                println!("{}", "Selection is already at the boundary".yellow())
            }
            EditOutcome::Pending => wait_for_insert(&mut session)?,
            _ => {}
        }
    }

    let page_count = session.begin_save_with(&plan_mode, output, mode.compresses())?;
    log::debug!("Writing {} pages", page_count);

    loop {
        match session.wait_event()? {
            SessionEvent::Saved(report) => {
                let message = format!(
                    "Saved {} pages to {}",
                    report.pages_written,
                    report.destination.display()
                );
                println!("{}", message.green());
                return Ok(());
            }
            SessionEvent::SaveFailed(e) => return Err(e).context("Failed to save"),
            other => log::debug!("Ignoring {:?}", other),
        }
    }
}

fn wait_for_insert(session: &mut Session<PdfAdapter>) -> Result<()> {
    loop {
        match session.wait_event()? {
            SessionEvent::Inserted(ids) => {
                println!("Inserted {} pages", ids.len());
                return Ok(());
            }
            SessionEvent::InsertFailed(e) => bail!("Failed to insert pages: {}", e),
            other => log::debug!("Ignoring {:?}", other),
        }
    }
}
