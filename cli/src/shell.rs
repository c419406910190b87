use crate::edit::{parse_page_ids, SaveMode};
use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use colored::*;
use pagewright::{
    Config, Direction, Edit, EditOutcome, Parity, PdfAdapter, Session, SessionEvent,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

const HELP: &str = "\
Pages are identified as shown by `show` (\"3\", or \"1:0\" for inserted pages).
Positions are 0-based.

  show                          list pages in their current order
  toggle <page>                 select or deselect a page
  all | none | invert           change the selection
  odd | even                    select every other page
  up | down                     move the selected pages
  move <from> <to>              move the page at one position to another
  rotate <degrees> [<page>...]  turn pages (selected ones by default) by 90 or -90
  insert <position> <file> [<page>...]
  blank <position>              insert an empty page
  delete [<page>...]            delete pages (selected ones by default)
  save <file> [keep-all|delete-selected|keep-selected|compress]
  open <file>                   start over with another document
  json <edit>                   apply an edit written as JSON
  help
  quit";

#[derive(Debug, PartialEq)]
pub enum Command {
    Show,
    Open(PathBuf),
    Edit(Edit),
    Save { output: PathBuf, mode: SaveMode },
    Help,
    Quit,
}

fn number(value: Option<&str>, what: &str) -> Result<usize> {
    let value = value.ok_or_else(|| anyhow!("Missing {}", what))?;
    value
        .parse()
        .with_context(|| format!("Invalid {} '{}'", what, value))
}

fn page_list(words: &[&str]) -> Result<Vec<pagewright::PageId>> {
    let words = words.iter().map(|w| w.to_string()).collect::<Vec<_>>();
    parse_page_ids(&words)
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let words = rest.split_whitespace().collect::<Vec<_>>();

    let edit = match name {
        "show" | "ls" => return Ok(Command::Show),
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        "open" => {
            if rest.trim().is_empty() {
                bail!("Missing file");
            }
            return Ok(Command::Open(PathBuf::from(rest.trim())));
        }
        "save" => {
            let output = words.first().ok_or_else(|| anyhow!("Missing output file"))?;
            let mode = match words.get(1) {
                Some(mode) => SaveMode::from_str(mode, true).map_err(|e| anyhow!(e))?,
                None => SaveMode::KeepAll,
            };
            return Ok(Command::Save {
                output: PathBuf::from(output),
                mode,
            });
        }
        "toggle" => {
            match page_list(&words)?.as_slice() {
                [page] => Edit::Toggle { page: *page },
                _ => bail!("toggle takes exactly one page"),
            }
        }
        "all" => Edit::SelectAll,
        "none" => Edit::ClearSelection,
        "invert" => Edit::InvertSelection,
        "odd" => Edit::SelectParity {
            parity: Parity::Odd,
        },
        "even" => Edit::SelectParity {
            parity: Parity::Even,
        },
        "up" => Edit::MoveSelected {
            direction: Direction::Up,
        },
        "down" => Edit::MoveSelected {
            direction: Direction::Down,
        },
        "move" => Edit::MovePage {
            from: number(words.first().copied(), "position")?,
            to: number(words.get(1).copied(), "position")?,
        },
        "rotate" => {
            let degrees = words
                .first()
                .ok_or_else(|| anyhow!("Missing degrees"))?
                .parse::<i32>()
                .context("Invalid degrees")?;
            match &words[1..] {
                [] => Edit::RotateSelected { degrees },
                pages => Edit::Rotate {
                    pages: page_list(pages)?,
                    degrees,
                },
            }
        }
        "insert" => {
            let position = number(words.first().copied(), "position")?;
            let source = words.get(1).ok_or_else(|| anyhow!("Missing file"))?;
            let pages = words
                .get(2..)
                .filter(|pages| !pages.is_empty())
                .map(|pages| {
                    pages
                        .iter()
                        .map(|page| number(Some(*page), "page"))
                        .collect::<Result<Vec<_>>>()
                })
                .transpose()?;
            Edit::Insert {
                position,
                source: PathBuf::from(source),
                pages,
            }
        }
        "blank" => Edit::InsertBlank {
            position: number(words.first().copied(), "position")?,
        },
        "delete" | "rm" => match words.as_slice() {
            [] => Edit::DeleteSelected,
            pages => Edit::Delete {
                pages: page_list(pages)?,
            },
        },
        "json" => serde_json::from_str(rest).context("Invalid edit")?,
        other => bail!("Unknown command '{}', try `help`", other),
    };

    Ok(Command::Edit(edit))
}

fn show(session: &Session<PdfAdapter>) {
    let store = session.store();
    if !store.is_open() {
        println!("No document is open");
        return;
    }

    for (position, id) in store.order().iter().enumerate() {
        let marker = if store.is_selected(*id) { "*" } else { " " };
        let rotation = store.effective_rotation(*id);
        let line = format!("{} {:>3}  page {:<6} {}", marker, position, id, rotation);
        if store.is_selected(*id) {
            println!("{}", line.bold());
        } else {
            println!("{}", line);
        }
    }
}

fn report(event: SessionEvent) {
    match event {
        SessionEvent::Opened { page_count } => println!("Opened {} pages", page_count),
        SessionEvent::OpenFailed(e) => {
            println!("{}", e.to_string().red());
            println!("Use `open <file>` to edit another document");
        }
        SessionEvent::Inserted(ids) => println!("Inserted {} pages", ids.len()),
        SessionEvent::InsertFailed(e) => println!("{}", e.to_string().red()),
        SessionEvent::Thumbnail { page, thumbnail } => log::debug!(
            "Preview of page {} ready ({}x{})",
            page,
            thumbnail.width(),
            thumbnail.height()
        ),
        SessionEvent::ThumbnailFailed { page, error } => {
            log::debug!("No preview for page {}: {}", page, error)
        }
        SessionEvent::Saved(report) => {
            let message = format!(
                "Saved {} pages to {}",
                report.pages_written,
                report.destination.display()
            );
            println!("{}", message.green());
            println!("Use `open <file>` to keep editing");
        }
        SessionEvent::SaveFailed(e) => println!("{}", format!("Save failed: {}", e).red()),
    }
}

pub fn run(config: Config, input: &Path) -> Result<()> {
    let mut session = Session::new(PdfAdapter::from_config(&config), config)?;
    let page_count = session
        .open_blocking(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    println!("Opened {} ({} pages), `help` lists commands", input.display(), page_count);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            session.poll_events().into_iter().for_each(report);
            continue;
        }

        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(Command::Help) => println!("{}", HELP),
            Ok(Command::Show) => show(&session),
            Ok(Command::Open(path)) => match session.open_blocking(&path) {
                Ok(page_count) => println!("Opened {} ({} pages)", path.display(), page_count),
                Err(e) => println!("{}", e.to_string().red()),
            },
            Ok(Command::Save { output, mode }) => {
                match session.begin_save_with(&mode.plan_mode(), &output, mode.compresses()) {
                    Ok(count) => println!("Saving {} pages in the background", count),
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
            Ok(Command::Edit(edit)) => match session.apply(&edit) {
                Ok(EditOutcome::AtBoundary) => {
                    println!("{}", "Selection is already at the boundary".yellow())
                }
                Ok(EditOutcome::Pending) => println!("Opening in the background"),
                Ok(_) => {}
                Err(e) => println!("{}", e.to_string().red()),
            },
            Err(e) => println!("{}", e.to_string().red()),
        }

        session.poll_events().into_iter().for_each(report);
    }

    // Let a running save finish before leaving.
    while session.is_saving() || session.is_loading() {
        report(session.wait_event()?);
    }
    Ok(())
}
