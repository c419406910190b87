mod compose;
mod pdf;
mod render;

pub use pdf::PdfAdapter;
pub use render::ImageFormat;

use crate::error::Result;
use crate::page::{PageSize, Rotation};
use crate::planner::PlannedPage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What the adapter learned about a document when opening it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub page_count: usize,
    /// Rotation stored in the document for each page, in page order.
    pub rotations: Vec<Rotation>,
    /// Media box of each page. May be shorter than `rotations`.
    pub sizes: Vec<PageSize>,
}

impl SourceInfo {
    pub fn new(rotations: Vec<Rotation>) -> Self {
        Self {
            page_count: rotations.len(),
            rotations,
            sizes: Vec::new(),
        }
    }

    pub fn with_sizes(mut self, sizes: Vec<PageSize>) -> Self {
        self.sizes = sizes;
        self
    }

    pub fn upright(page_count: usize) -> Self {
        Self::new(vec![Rotation::R0; page_count])
    }

    pub fn rotation(&self, page: usize) -> Rotation {
        self.rotations.get(page).copied().unwrap_or_default()
    }

    pub fn size(&self, page: usize) -> PageSize {
        self.sizes.get(page).copied().unwrap_or_default()
    }
}

/// Where the pages of a source come from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    File(PathBuf),
    /// A single empty page that exists nowhere on disk.
    Blank(PageSize),
}

impl Origin {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Origin::File(path) => Some(path),
            Origin::Blank(_) => None,
        }
    }
}

impl From<PathBuf> for Origin {
    fn from(path: PathBuf) -> Self {
        Origin::File(path)
    }
}

/// Entries of a document's information dictionary. `None` means absent, or
/// left alone when used as an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
}

impl Metadata {
    /// Copies every entry `update` sets over this one.
    pub fn update(&mut self, update: &Metadata) {
        let fields = [
            (&mut self.title, &update.title),
            (&mut self.author, &update.author),
            (&mut self.subject, &update.subject),
            (&mut self.keywords, &update.keywords),
            (&mut self.creator, &update.creator),
            (&mut self.producer, &update.producer),
        ];
        for (field, value) in fields {
            if value.is_some() {
                *field = value.clone();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}

/// A rendered preview of one page.
#[derive(Debug, Clone, Serialize)]
pub struct Thumbnail {
    #[serde(with = "base64")]
    preview_jpg: Vec<u8>,
    dimensions: (u32, u32),
}

impl Thumbnail {
    pub fn new(preview_jpg: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self {
            preview_jpg,
            dimensions,
        }
    }

    pub fn jpeg(&self) -> &[u8] {
        &self.preview_jpg
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }
}

pub trait DocumentAdapter {
    /// Enumerates the pages of a document and their stored rotation.
    fn open(&self, path: &Path) -> Result<SourceInfo>;

    /// Renders `page` scaled by `scale`, turned by `rotation` on top of the
    /// rotation stored in the document.
    fn render_thumbnail(
        &self,
        path: &Path,
        page: usize,
        scale: f32,
        rotation: Rotation,
    ) -> Result<Thumbnail>;

    /// Whether [`DocumentAdapter::write_subset`] writes each page with its
    /// planned rotation. When `false` the copy keeps the original rotation and
    /// the caller has to go through [`DocumentAdapter::apply_rotations`].
    fn copy_carries_rotation(&self) -> bool;

    /// Writes a new document containing `pages`, in order. A page's `source`
    /// indexes into `sources`.
    fn write_subset(&self, sources: &[Origin], pages: &[PlannedPage], output: &Path)
        -> Result<()>;

    /// Copies `input` to `output`, setting the absolute rotation of the pages
    /// at the given 0-based positions.
    fn apply_rotations(
        &self,
        input: &Path,
        rotations: &BTreeMap<usize, Rotation>,
        output: &Path,
    ) -> Result<()>;

    fn protect(
        &self,
        input: &Path,
        user_password: &str,
        owner_password: Option<&str>,
        output: &Path,
    ) -> Result<()>;

    fn remove_protection(&self, input: &Path, password: &str, output: &Path) -> Result<()>;

    /// Concatenates `inputs`, returning the number of pages written.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<usize>;

    /// Writes one document per inclusive, 0-based range. Ranges outside of the
    /// document are skipped.
    fn split_by_ranges(
        &self,
        input: &Path,
        ranges: &[(usize, usize)],
        output_dir: &Path,
        base_name: &str,
    ) -> Result<Vec<PathBuf>>;

    fn compress(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Splits `page_count` pages into at most `parts` inclusive ranges of equal
/// length, the last one possibly shorter.
pub fn equal_ranges(page_count: usize, parts: usize) -> Vec<(usize, usize)> {
    if page_count == 0 || parts == 0 {
        return Vec::new();
    }

    let per_part = page_count.div_ceil(parts);
    (0..parts)
        .map(|part| part * per_part)
        .take_while(|start| *start < page_count)
        .map(|start| (start, (start + per_part - 1).min(page_count - 1)))
        .collect()
}

mod base64 {
    use base64::prelude::*;
    use serde::{Deserialize, Serialize};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(v: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        let base64 = BASE64_STANDARD.encode(v);
        String::serialize(&base64, s)
    }
}
