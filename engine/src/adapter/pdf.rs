use super::compose::{self, PageSelector};
use super::render::{self, ImageFormat};
use super::{DocumentAdapter, Metadata, Origin, SourceInfo, Thumbnail};
use crate::config::Config;
use crate::error::{EditError, Result};
use crate::page::Rotation;
use crate::planner::PlannedPage;
use lopdf::Document;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// PDF access through lopdf, with pdfium for anything that needs pixels.
///
/// `write_subset` keeps each page's stored rotation; planned rotations are
/// written by `apply_rotations`.
#[derive(Debug, Clone)]
pub struct PdfAdapter {
    pdfium_dirs: Vec<PathBuf>,
    compress: bool,
}

impl Default for PdfAdapter {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PdfAdapter {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pdfium_dirs: config.pdfium_dirs.clone(),
            compress: config.compress_output,
        }
    }

    /// Renders the given 0-based pages to `output_dir`, one file per page.
    pub fn export_images(
        &self,
        input: &Path,
        pages: &[usize],
        output_dir: &Path,
        format: ImageFormat,
        dpi: u32,
    ) -> Result<Vec<PathBuf>> {
        let info = self.open(input)?;
        if let Some(page) = pages.iter().find(|page| **page >= info.page_count) {
            return Err(EditError::UnknownSourcePage {
                path: input.to_path_buf(),
                page: *page,
                page_count: info.page_count,
            });
        }

        render::export_images(&self.pdfium_dirs, input, pages, output_dir, format, dpi).map_err(
            |e| EditError::Render {
                path: input.to_path_buf(),
                page: pages.first().copied().unwrap_or_default(),
                reason: format!("{:#}", e),
            },
        )
    }

    pub fn metadata(&self, path: &Path) -> Result<Metadata> {
        let document = self.load(path)?;
        Ok(compose::read_metadata(&document))
    }

    /// Copies `input` to `output` with the entries `update` sets replaced.
    /// Returns the resulting metadata.
    pub fn set_metadata(&self, input: &Path, update: &Metadata, output: &Path) -> Result<Metadata> {
        let mut document = self.load(input)?;
        if document.is_encrypted() {
            return Err(EditError::write_failure(
                output,
                "remove the protection before changing the metadata",
            ));
        }

        let mut metadata = compose::read_metadata(&document);
        metadata.update(update);
        compose::write_metadata(&mut document, &metadata);

        self.write(&mut document, output)?;
        Ok(metadata)
    }

    pub fn split_equal(
        &self,
        input: &Path,
        parts: usize,
        output_dir: &Path,
        base_name: &str,
    ) -> Result<Vec<PathBuf>> {
        let info = self.open(input)?;
        let ranges = super::equal_ranges(info.page_count, parts);
        self.split_by_ranges(input, &ranges, output_dir, base_name)
    }

    fn load(&self, path: &Path) -> Result<Document> {
        compose::load_document(path).map_err(|e| EditError::unreadable(path, format!("{:#}", e)))
    }

    /// Saves through a temporary file next to `output`, so `output` is either
    /// the complete new document or untouched. `output` may be one of the inputs.
    fn write(&self, document: &mut Document, output: &Path) -> Result<()> {
        let dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let staged = tempfile::Builder::new()
            .prefix(".pagewright-")
            .suffix(".pdf")
            .tempfile_in(dir)
            .map_err(|e| EditError::write_failure(output, e))?;

        compose::save(document, staged.path(), self.compress)
            .map_err(|e| EditError::write_failure(output, format!("{:#}", e)))?;

        staged
            .persist(output)
            .map_err(|e| EditError::write_failure(output, e.error))?;

        log::debug!("Wrote {}", output.display());
        Ok(())
    }

    fn compose_and_write(
        &self,
        documents: Vec<Document>,
        selectors: &[PageSelector],
        output: &Path,
    ) -> Result<()> {
        let mut document = compose::compose(documents, selectors)
            .map_err(|e| EditError::write_failure(output, format!("{:#}", e)))?;
        self.write(&mut document, output)
    }
}

impl DocumentAdapter for PdfAdapter {
    fn open(&self, path: &Path) -> Result<SourceInfo> {
        let document = self.load(path)?;
        let rotations = compose::page_rotations(&document);

        if rotations.is_empty() {
            return Err(EditError::unreadable(path, "the document has no pages"));
        }

        log::debug!("Opened {} ({} pages)", path.display(), rotations.len());
        Ok(SourceInfo::new(rotations).with_sizes(compose::page_sizes(&document)))
    }

    fn render_thumbnail(
        &self,
        path: &Path,
        page: usize,
        scale: f32,
        rotation: Rotation,
    ) -> Result<Thumbnail> {
        render::render_thumbnail(&self.pdfium_dirs, path, page, scale, rotation).map_err(|e| {
            EditError::Render {
                path: path.to_path_buf(),
                page,
                reason: format!("{:#}", e),
            }
        })
    }

    fn copy_carries_rotation(&self) -> bool {
        false
    }

    fn write_subset(
        &self,
        sources: &[Origin],
        pages: &[PlannedPage],
        output: &Path,
    ) -> Result<()> {
        // Only load the sources that are actually used, in a compact index.
        let mut used: BTreeMap<usize, usize> = BTreeMap::new();
        for page in pages.iter() {
            let next = used.len();
            used.entry(page.id.source).or_insert(next);
        }

        let mut ordered = used.iter().map(|(source, slot)| (*slot, *source)).collect::<Vec<_>>();
        ordered.sort();

        let mut documents = Vec::with_capacity(ordered.len());
        for (_, source) in ordered.iter() {
            let origin = sources.get(*source).ok_or_else(|| {
                EditError::write_failure(output, format!("Unknown source {}", source))
            })?;
            documents.push(match origin {
                Origin::File(path) => self.load(path)?,
                Origin::Blank(size) => compose::blank_document(*size),
            });
        }

        let selectors = pages
            .iter()
            .map(|page| (used[&page.id.source], page.id.page, None))
            .collect::<Vec<_>>();

        self.compose_and_write(documents, &selectors, output)
    }

    fn apply_rotations(
        &self,
        input: &Path,
        rotations: &BTreeMap<usize, Rotation>,
        output: &Path,
    ) -> Result<()> {
        // The input is an intermediate artifact, failing to read it is a write failure.
        let mut document = compose::load_document(input)
            .map_err(|e| EditError::write_failure(output, format!("{:#}", e)))?;
        compose::rotate_pages(&mut document, rotations)
            .map_err(|e| EditError::write_failure(output, format!("{:#}", e)))?;
        self.write(&mut document, output)
    }

    fn protect(
        &self,
        input: &Path,
        user_password: &str,
        owner_password: Option<&str>,
        output: &Path,
    ) -> Result<()> {
        if user_password.is_empty() {
            return Err(EditError::EmptyPassword);
        }

        let mut document = self.load(input)?;
        if document.is_encrypted() {
            return Err(EditError::write_failure(
                output,
                "the document is already protected",
            ));
        }

        let owner_password = owner_password.unwrap_or(user_password);
        if self.compress {
            document.compress();
        }
        compose::encrypt(&mut document, user_password, owner_password)
            .map_err(|e| EditError::write_failure(output, format!("{:#}", e)))?;

        // Compressing an encrypted document would mangle its streams.
        let writer = Self {
            compress: false,
            ..self.clone()
        };
        writer.write(&mut document, output)
    }

    fn remove_protection(&self, input: &Path, password: &str, output: &Path) -> Result<()> {
        let mut document = self.load(input)?;

        if document.is_encrypted() {
            document
                .decrypt(password)
                .map_err(|_| EditError::WrongPassword {
                    path: input.to_path_buf(),
                })?;
            document.trailer.remove(b"Encrypt");
            document.prune_objects();
        } else {
            log::info!("{} is not protected, copying it as is", input.display());
        }

        self.write(&mut document, output)
    }

    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<usize> {
        if inputs.is_empty() {
            return Err(EditError::EmptyResult);
        }

        let mut documents = Vec::with_capacity(inputs.len());
        let mut selectors = Vec::new();
        for (source, path) in inputs.iter().enumerate() {
            let document = self.load(path)?;
            let page_count = document.get_pages().len();
            selectors.extend((0..page_count).map(|page| (source, page, None)));
            documents.push(document);
        }

        if selectors.is_empty() {
            return Err(EditError::EmptyResult);
        }

        log::info!("Merging {} documents into {}", inputs.len(), output.display());
        self.compose_and_write(documents, &selectors, output)?;
        Ok(selectors.len())
    }

    fn split_by_ranges(
        &self,
        input: &Path,
        ranges: &[(usize, usize)],
        output_dir: &Path,
        base_name: &str,
    ) -> Result<Vec<PathBuf>> {
        let document = self.load(input)?;
        let page_count = document.get_pages().len();

        fs::create_dir_all(output_dir).map_err(|e| EditError::write_failure(output_dir, e))?;

        let mut written = Vec::new();
        for (index, (start, end)) in ranges.iter().enumerate() {
            if start > end || *end >= page_count {
                log::warn!("Skipping range {}-{} of {}", start, end, input.display());
                continue;
            }

            let output = output_dir.join(format!("{}_{:02}.pdf", base_name, index + 1));
            let selectors = (*start..=*end).map(|page| (0, page, None)).collect::<Vec<_>>();
            self.compose_and_write(vec![document.clone()], &selectors, &output)?;
            written.push(output);
        }

        Ok(written)
    }

    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        let mut document = self.load(input)?;
        document.prune_objects();

        let writer = Self {
            compress: true,
            ..self.clone()
        };
        writer.write(&mut document, output)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures;
    use crate::page::{PageId, PageSize};

    fn files(paths: &[PathBuf]) -> Vec<Origin> {
        paths.iter().cloned().map(Origin::File).collect()
    }

    fn planned(source: usize, page: usize, rotation: Rotation) -> PlannedPage {
        PlannedPage {
            id: PageId::new(source, page),
            original: Rotation::R0,
            rotation,
        }
    }

    #[test]
    fn test_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 90, -90]);

        let info = PdfAdapter::default().open(&path).unwrap();
        assert_eq!(3, info.page_count);
        assert_eq!(PageSize::new(612.0, 792.0), info.size(2));
        assert_eq!(
            vec![Rotation::R0, Rotation::R90, Rotation::R270],
            info.rotations
        );
    }

    #[test]
    fn test_open_returns_errors() {
        let result = PdfAdapter::default().open(Path::new("test/potato.pdf"));
        assert!(matches!(result, Err(EditError::SourceUnreadable { .. })));
    }

    #[test]
    fn test_write_subset_ignores_planned_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let host = fixtures::write_pdf(dir.path(), "host.pdf", &[0, 180, 0]);
        let other = fixtures::write_pdf(dir.path(), "other.pdf", &[0, 0]);
        let output = dir.path().join("out.pdf");

        let pages = vec![
            planned(1, 1, Rotation::R90),
            planned(0, 1, Rotation::R0),
            planned(0, 0, Rotation::R270),
        ];
        PdfAdapter::default()
            .write_subset(&files(&[host, other]), &pages, &output)
            .unwrap();

        assert_eq!(
            vec!["Page 2", "Page 2", "Page 1"],
            fixtures::page_labels(&output)
        );
        assert_eq!(vec![0, 180, 0], fixtures::page_rotations(&output));
    }

    #[test]
    fn test_write_subset_with_unused_host() {
        let dir = tempfile::tempdir().unwrap();
        let host = fixtures::write_pdf(dir.path(), "host.pdf", &[0]);
        let other = fixtures::write_pdf(dir.path(), "other.pdf", &[0, 0, 0]);
        let output = dir.path().join("out.pdf");

        let pages = vec![planned(1, 2, Rotation::R0)];
        PdfAdapter::default()
            .write_subset(&files(&[host, other]), &pages, &output)
            .unwrap();

        assert_eq!(vec!["Page 3"], fixtures::page_labels(&output));
    }

    #[test]
    fn test_write_subset_with_blank_page() {
        let dir = tempfile::tempdir().unwrap();
        let host = fixtures::write_pdf(dir.path(), "host.pdf", &[0, 0]);
        let output = dir.path().join("out.pdf");

        let sources = vec![
            Origin::File(host),
            Origin::Blank(PageSize::new(612.0, 792.0)),
        ];
        let pages = vec![
            planned(0, 0, Rotation::R0),
            planned(1, 0, Rotation::R0),
            planned(0, 1, Rotation::R0),
        ];
        PdfAdapter::default()
            .write_subset(&sources, &pages, &output)
            .unwrap();

        let info = PdfAdapter::default().open(&output).unwrap();
        assert_eq!(3, info.page_count);
        assert_eq!(PageSize::new(612.0, 792.0), info.size(1));
        let document = Document::load(&output).unwrap();
        let blank = document.get_pages()[&2];
        assert!(document.get_page_content(blank).unwrap().is_empty());
    }

    #[test]
    fn test_apply_rotations_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 90]);

        let rotations = BTreeMap::from([(0, Rotation::R270), (1, Rotation::R0)]);
        PdfAdapter::default()
            .apply_rotations(&path, &rotations, &path)
            .unwrap();

        assert_eq!(vec![270, 0], fixtures::page_rotations(&path));
    }

    #[test]
    fn test_apply_rotations_failure_leaves_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0]);
        let output = dir.path().join("out.pdf");

        let rotations = BTreeMap::from([(4, Rotation::R90)]);
        let result = PdfAdapter::default().apply_rotations(&path, &rotations, &output);

        assert!(matches!(result, Err(EditError::AdapterWriteFailure { .. })));
        assert!(!output.exists());
    }

    #[test]
    fn test_merge_documents() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]),
            fixtures::write_pdf(dir.path(), "paysage.pdf", &[90, 90, 90]),
        ];
        let output = dir.path().join("merged.pdf");

        let count = PdfAdapter::default().merge(&inputs, &output).unwrap();

        assert_eq!(5, count);
        assert_eq!(
            vec!["Page 1", "Page 2", "Page 1", "Page 2", "Page 3"],
            fixtures::page_labels(&output)
        );
        assert_eq!(vec![0, 0, 90, 90, 90], fixtures::page_rotations(&output));
    }

    #[test]
    fn test_merge_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let result = PdfAdapter::default().merge(&[], &dir.path().join("merged.pdf"));
        assert!(matches!(result, Err(EditError::EmptyResult)));
    }

    #[test]
    fn test_split_by_ranges_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0, 0, 0]);
        let output_dir = dir.path().join("parts");

        let written = PdfAdapter::default()
            .split_by_ranges(&path, &[(0, 1), (3, 2), (2, 9), (3, 3)], &output_dir, "part")
            .unwrap();

        assert_eq!(
            vec![output_dir.join("part_01.pdf"), output_dir.join("part_04.pdf")],
            written
        );
        assert_eq!(vec!["Page 1", "Page 2"], fixtures::page_labels(&written[0]));
        assert_eq!(vec!["Page 4"], fixtures::page_labels(&written[1]));
    }

    #[test]
    fn test_split_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0, 0, 0, 0]);

        let written = PdfAdapter::default()
            .split_equal(&path, 2, dir.path(), "half")
            .unwrap();

        assert_eq!(2, written.len());
        assert_eq!(3, fixtures::page_labels(&written[0]).len());
        assert_eq!(2, fixtures::page_labels(&written[1]).len());
    }

    #[test]
    fn test_compress_keeps_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 270]);
        let output = dir.path().join("small.pdf");

        PdfAdapter::default().compress(&path, &output).unwrap();

        assert_eq!(vec!["Page 1", "Page 2"], fixtures::page_labels(&output));
        assert_eq!(vec![0, 270], fixtures::page_rotations(&output));
    }

    #[test]
    fn test_protect_requires_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0]);

        let result = PdfAdapter::default().protect(&path, "", None, &dir.path().join("locked.pdf"));
        assert!(matches!(result, Err(EditError::EmptyPassword)));
    }

    #[test]
    fn test_protect_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 90]);
        let locked = dir.path().join("locked.pdf");
        let unlocked = dir.path().join("unlocked.pdf");
        let adapter = PdfAdapter::default();

        adapter.protect(&path, "secret", None, &locked).unwrap();

        let result = adapter.remove_protection(&locked, "nope", &unlocked);
        assert!(matches!(result, Err(EditError::WrongPassword { .. })));
        assert!(!unlocked.exists());

        adapter.remove_protection(&locked, "secret", &unlocked).unwrap();
        assert_eq!(vec!["Page 1", "Page 2"], fixtures::page_labels(&unlocked));
        assert_eq!(vec![0, 90], fixtures::page_rotations(&unlocked));
    }

    #[test]
    fn test_set_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let output = dir.path().join("titled.pdf");
        let adapter = PdfAdapter::default();

        let update = Metadata {
            title: Some("Quarterly report".into()),
            ..Metadata::default()
        };
        adapter.set_metadata(&path, &update, &output).unwrap();

        let update = Metadata {
            author: Some("Finance".into()),
            ..Metadata::default()
        };
        let written = adapter.set_metadata(&output, &update, &output).unwrap();

        assert_eq!(written, adapter.metadata(&output).unwrap());
        assert_eq!(Some("Quarterly report"), written.title.as_deref());
        assert_eq!(Some("Finance"), written.author.as_deref());
        assert!(adapter.metadata(&path).unwrap().is_empty());
        assert_eq!(vec!["Page 1", "Page 2"], fixtures::page_labels(&output));
    }

    #[test]
    fn test_remove_protection_of_plain_document_copies_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let output = dir.path().join("open.pdf");

        PdfAdapter::default()
            .remove_protection(&path, "secret", &output)
            .unwrap();

        assert_eq!(vec!["Page 1", "Page 2"], fixtures::page_labels(&output));
    }
}
