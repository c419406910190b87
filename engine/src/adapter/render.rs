use super::Thumbnail;
use crate::page::Rotation;
use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::env::consts::{ARCH, OS};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(format!("Unsupported image format '{}', use png or jpg", other)),
        }
    }
}

pub(crate) fn pdfium(search_dirs: &[PathBuf]) -> Result<Pdfium> {
    for path in search_dirs.iter() {
        let mut prefix = OsString::new();
        prefix.push(path);
        prefix.push(ARCH);
        prefix.push("-");
        prefix.push(OS);

        let name = Pdfium::pdfium_platform_library_name_at_path(&prefix);

        if let Ok(lib) = Pdfium::bind_to_library(name) {
            return Ok(Pdfium::new(lib));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| anyhow!("Failed to load Pdfium library: {}", e))
}

fn render_rotation(rotation: Rotation) -> PdfPageRenderRotation {
    match rotation {
        Rotation::R0 => PdfPageRenderRotation::None,
        Rotation::R90 => PdfPageRenderRotation::Degrees90,
        Rotation::R180 => PdfPageRenderRotation::Degrees180,
        Rotation::R270 => PdfPageRenderRotation::Degrees270,
    }
}

fn render_page(
    pdfium: &Pdfium,
    path: &Path,
    page: usize,
    scale: f32,
    rotation: Rotation,
) -> Result<DynamicImage> {
    let document = pdfium.load_pdf_from_file(path, None)?;
    let pdf_page = document
        .pages()
        .iter()
        .nth(page)
        .ok_or_else(|| anyhow!("Page {} not found", page))?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .rotate(render_rotation(rotation), false);

    let image = pdf_page.render_with_config(&render_config)?.as_image();
    Ok(image)
}

pub(crate) fn render_thumbnail(
    search_dirs: &[PathBuf],
    path: &Path,
    page: usize,
    scale: f32,
    rotation: Rotation,
) -> Result<Thumbnail> {
    let pdfium = pdfium(search_dirs)?;
    let img = render_page(&pdfium, path, page, scale, rotation)?.into_rgb8();

    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Jpeg)?;

    Ok(Thumbnail::new(bytes.into_inner(), img.dimensions()))
}

/// Writes `page_001.png`, `page_002.png`... for the given 0-based pages.
pub(crate) fn export_images(
    search_dirs: &[PathBuf],
    path: &Path,
    pages: &[usize],
    output_dir: &Path,
    format: ImageFormat,
    dpi: u32,
) -> Result<Vec<PathBuf>> {
    let pdfium = pdfium(search_dirs)?;
    fs::create_dir_all(output_dir)?;

    let scale = dpi as f32 / 72.0;
    let mut written = Vec::with_capacity(pages.len());

    for page in pages.iter() {
        let img = render_page(&pdfium, path, *page, scale, Rotation::R0)?;
        let file_name = format!("page_{:03}.{}", page + 1, format.extension());
        let output = output_dir.join(file_name);

        match format {
            ImageFormat::Png => img.save_with_format(&output, image::ImageFormat::Png)?,
            ImageFormat::Jpeg => {
                let writer = BufWriter::new(File::create(&output)?);
                JpegEncoder::new_with_quality(writer, JPEG_QUALITY).encode_image(&img.into_rgb8())?;
            }
        }

        log::debug!("Exported page {} to {}", page + 1, output.display());
        written.push(output);
    }

    Ok(written)
}
