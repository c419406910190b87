use anyhow::{bail, Context, Result};
use colored::*;
use pagewright::{Config, DocumentAdapter, ImageFormat, Metadata, PdfAdapter, Rotation};
use rpassword::prompt_password;
use std::fs;
use std::path::{Path, PathBuf};

/// Parses 1-based pages and ranges like `1-3,5` into inclusive 0-based
/// ranges.
pub fn parse_ranges(text: &str) -> Result<Vec<(usize, usize)>> {
    let page = |value: &str| -> Result<usize> {
        let number = value
            .trim()
            .parse::<usize>()
            .with_context(|| format!("Invalid page number '{}'", value.trim()))?;
        if number == 0 {
            bail!("Page numbers start at 1");
        }
        Ok(number - 1)
    };

    text.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| match part.split_once('-') {
            Some((start, end)) => Ok((page(start)?, page(end)?)),
            None => page(part).map(|index| (index, index)),
        })
        .collect()
}

fn password(given: Option<String>, prompt: &str) -> Result<String> {
    match given {
        Some(password) => Ok(password),
        None => Ok(prompt_password(prompt)?),
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "part".to_string())
}

pub fn merge(config: &Config, inputs: &[PathBuf], output: &Path) -> Result<()> {
    let adapter = PdfAdapter::from_config(config);
    let pages = adapter.merge(inputs, output).context("Failed to merge")?;
    println!(
        "{}",
        format!("Merged {} pages into {}", pages, output.display()).green()
    );
    Ok(())
}

pub fn split(
    config: &Config,
    input: &Path,
    ranges: Option<String>,
    parts: Option<usize>,
    output_dir: &Path,
    name: Option<String>,
) -> Result<()> {
    let adapter = PdfAdapter::from_config(config);
    let name = name.unwrap_or_else(|| stem(input));

    let written = match (ranges, parts) {
        (Some(ranges), _) => {
            let ranges = parse_ranges(&ranges)?;
            adapter.split_by_ranges(input, &ranges, output_dir, &name)?
        }
        (None, Some(parts)) => adapter.split_equal(input, parts, output_dir, &name)?,
        (None, None) => bail!("Either --ranges or --parts is required"),
    };

    if written.is_empty() {
        bail!("None of the ranges matched pages of {}", input.display());
    }
    for path in written.iter() {
        println!("{}", path.display());
    }
    println!("{}", format!("Wrote {} documents", written.len()).green());
    Ok(())
}

pub fn protect(
    config: &Config,
    input: &Path,
    output: &Path,
    user_password: Option<String>,
    owner_password: Option<String>,
) -> Result<()> {
    let user_password = password(user_password, "Password: ")?;
    let adapter = PdfAdapter::from_config(config);
    adapter
        .protect(input, &user_password, owner_password.as_deref(), output)
        .with_context(|| format!("Failed to protect {}", input.display()))?;
    println!("{}", format!("Protected {}", output.display()).green());
    Ok(())
}

pub fn unprotect(
    config: &Config,
    input: &Path,
    output: &Path,
    given: Option<String>,
) -> Result<()> {
    let password = password(given, "Password: ")?;
    let adapter = PdfAdapter::from_config(config);
    adapter.remove_protection(input, &password, output)?;
    println!("{}", format!("Wrote {}", output.display()).green());
    Ok(())
}

pub fn compress(config: &Config, input: &Path, output: &Path) -> Result<()> {
    let adapter = PdfAdapter::from_config(config);
    adapter
        .compress(input, output)
        .with_context(|| format!("Failed to compress {}", input.display()))?;

    let before = fs::metadata(input)?.len();
    let after = fs::metadata(output)?.len();
    println!(
        "{}",
        format!("{} bytes -> {} bytes", before, after).green()
    );
    Ok(())
}

pub fn metadata(config: &Config, input: &Path) -> Result<()> {
    let adapter = PdfAdapter::from_config(config);
    let metadata = adapter.metadata(input)?;
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

pub fn set_metadata(config: &Config, input: &Path, output: &Path, update: &Metadata) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to change, pass at least one of --title, --author, --subject, --keywords, --creator or --producer");
    }

    let adapter = PdfAdapter::from_config(config);
    let metadata = adapter
        .set_metadata(input, update, output)
        .with_context(|| format!("Failed to update {}", input.display()))?;
    log::debug!("New metadata: {:?}", metadata);
    println!("{}", format!("Wrote {}", output.display()).green());
    Ok(())
}

pub fn thumbnails(config: &Config, input: &Path, output_dir: &Path, json: bool) -> Result<()> {
    let adapter = PdfAdapter::from_config(config);
    let info = adapter.open(input)?;
    if !json {
        fs::create_dir_all(output_dir)?;
    }

    for page in 0..info.page_count {
        let thumbnail =
            adapter.render_thumbnail(input, page, config.thumbnail_scale, Rotation::R0)?;

        if json {
            println!("{}", serde_json::to_string(&thumbnail)?);
        } else {
            let path = output_dir.join(format!("thumb_{:03}.jpg", page + 1));
            fs::write(&path, thumbnail.jpeg())?;
            log::info!(
                "Wrote {} ({}x{})",
                path.display(),
                thumbnail.width(),
                thumbnail.height()
            );
        }
    }
    Ok(())
}

pub fn export_images(
    config: &Config,
    input: &Path,
    output_dir: &Path,
    pages: Option<String>,
    format: ImageFormat,
    dpi: Option<u32>,
) -> Result<()> {
    let adapter = PdfAdapter::from_config(config);
    let pages = match pages {
        Some(pages) => parse_ranges(&pages)?
            .into_iter()
            .flat_map(|(start, end)| start..=end)
            .collect::<Vec<_>>(),
        None => (0..adapter.open(input)?.page_count).collect(),
    };

    let written = adapter.export_images(
        input,
        &pages,
        output_dir,
        format,
        dpi.unwrap_or(config.image_dpi),
    )?;
    println!("{}", format!("Wrote {} images", written.len()).green());
    Ok(())
}
