use super::Metadata;
use crate::page::{PageSize, Rotation};
use anyhow::{anyhow, Context, Result};
use lopdf::encryption::{EncryptionState, EncryptionVersion, Permissions};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

// Page trees deeper than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 64;

/// A page to copy: source document index, 0-based page index, and the
/// rotation to write (`None` keeps the page's stored rotation).
pub(crate) type PageSelector = (usize, usize, Option<Rotation>);

pub(crate) fn load_document(path: &Path) -> Result<Document> {
    let bytes = fs::read(path)?;

    // Some producers put garbage before the header.
    let head = &bytes[..bytes.len().min(1024)];
    let offset = head.windows(5).position(|w| w == b"%PDF-").ok_or_else(|| {
        anyhow!("Failed to find PDF header in file {}", path.to_string_lossy())
    })?;

    let document = Document::load_from(Cursor::new(&bytes[offset..]))?;
    Ok(document)
}

pub(crate) fn page_rotations(document: &Document) -> Vec<Rotation> {
    document
        .get_pages()
        .into_values()
        .map(|page_id| page_rotation(document, page_id))
        .collect()
}

pub(crate) fn page_rotation(document: &Document, page_id: ObjectId) -> Rotation {
    let Some(value) = inherited_attribute(document, page_id, b"Rotate") else {
        return Rotation::R0;
    };

    match value.as_i64().ok().and_then(Rotation::from_degrees) {
        Some(rotation) => rotation,
        None => {
            log::warn!("Ignoring invalid /Rotate {:?} on page {:?}", value, page_id);
            Rotation::R0
        }
    }
}

pub(crate) fn page_sizes(document: &Document) -> Vec<PageSize> {
    document
        .get_pages()
        .into_values()
        .map(|page_id| page_size(document, page_id))
        .collect()
}

fn page_size(document: &Document, page_id: ObjectId) -> PageSize {
    let corners = inherited_attribute(document, page_id, b"MediaBox")
        .and_then(|value| value.as_array().ok().cloned())
        .map(|values| {
            values
                .iter()
                .filter_map(|value| value.as_float().ok())
                .collect::<Vec<_>>()
        });

    match corners.as_deref() {
        Some([x0, y0, x1, y1]) => PageSize::new((x1 - x0).abs(), (y1 - y0).abs()),
        _ => {
            log::warn!("Page {:?} has no usable /MediaBox", page_id);
            PageSize::default()
        }
    }
}

/// A one page document with nothing on the page.
pub(crate) fn blank_document(size: PageSize) -> Document {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();

    let content_id = document.add_object(Stream::new(Dictionary::new(), Vec::new()));
    let page_id = document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), size.width.into(), size.height.into()],
        "Resources" => Dictionary::new(),
        "Contents" => content_id,
    });
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document
}

const INFO_KEYS: [&[u8]; 6] = [
    b"Title",
    b"Author",
    b"Subject",
    b"Keywords",
    b"Creator",
    b"Producer",
];

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        Object::Dictionary(dictionary) => Some(dictionary),
        _ => None,
    }
}

pub(crate) fn read_metadata(document: &Document) -> Metadata {
    let Some(info) = info_dictionary(document) else {
        return Metadata::default();
    };

    let mut values = INFO_KEYS.iter().map(|key| match info.get(key) {
        Ok(Object::String(bytes, _)) => Some(decode_text(bytes)),
        _ => None,
    });
    let mut next = || values.next().flatten();

    Metadata {
        title: next(),
        author: next(),
        subject: next(),
        keywords: next(),
        creator: next(),
        producer: next(),
    }
}

pub(crate) fn write_metadata(document: &mut Document, metadata: &Metadata) {
    let mut info = info_dictionary(document).cloned().unwrap_or_default();
    let values = [
        &metadata.title,
        &metadata.author,
        &metadata.subject,
        &metadata.keywords,
        &metadata.creator,
        &metadata.producer,
    ];
    for (key, value) in INFO_KEYS.iter().zip(values) {
        match value {
            Some(text) => info.set(key.to_vec(), encode_text(text)),
            None => {
                info.remove(key);
            }
        }
    }

    match document.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => {
            let id = *id;
            document.objects.insert(id, Object::Dictionary(info));
        }
        _ => {
            let id = document.add_object(info);
            document.trailer.set("Info", id);
        }
    }
}

// Text strings are UTF-16BE behind a byte order mark, or PDFDocEncoding which
// matches Latin-1 for printable characters.
fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect::<Vec<_>>();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|byte| char::from(*byte)).collect(),
    }
}

fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }

    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn inherited_attribute(document: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = document.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = document.get_dictionary(parent).ok()?;
    }

    None
}

fn set_rotation(dictionary: &mut Dictionary, rotation: Rotation) {
    match rotation.as_rotation() {
        Some(degrees) => dictionary.set("Rotate", degrees as i64),
        None => {
            dictionary.remove(b"Rotate");
        }
    }
}

/// Builds a new document out of pages picked from `documents`.
///
/// Inheritable attributes are copied onto each page before it is re-parented
/// so that pages keep their resources, boxes and rotation in the new tree.
pub(crate) fn compose(documents: Vec<Document>, selectors: &[PageSelector]) -> Result<Document> {
    // Starting `max_id`, used as the first object id of each renumbered document.
    let mut max_id = 1;
    let mut documents_objects = BTreeMap::new();
    let mut document = Document::with_version("1.5");

    let mut source_pages: Vec<Vec<(ObjectId, Dictionary)>> = Vec::new();

    for mut doc in documents.into_iter() {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let mut pages = Vec::new();
        for page_id in doc.get_pages().into_values() {
            let mut dictionary = doc
                .get_dictionary(page_id)
                .with_context(|| format!("Page object {:?} is not a dictionary", page_id))?
                .clone();

            for key in INHERITABLE {
                if !dictionary.has(key) {
                    if let Some(value) = inherited_attribute(&doc, page_id, key) {
                        dictionary.set(key.to_vec(), value);
                    }
                }
            }

            pages.push((page_id, dictionary));
        }

        source_pages.push(pages);
        documents_objects.extend(doc.objects);
    }

    // "Catalog" and "Pages" are mandatory.
    let mut catalog_object: Option<(ObjectId, Object)> = None;
    let mut pages_object: Option<(ObjectId, Dictionary)> = None;

    for (object_id, object) in documents_objects.iter() {
        match object.type_name().unwrap_or(b"") {
            b"Catalog" => {
                // The first catalog wins.
                if catalog_object.is_none() {
                    catalog_object = Some((*object_id, object.clone()));
                }
            }
            b"Pages" => {
                // Every page tree node is folded into a single root.
                if let Ok(dictionary) = object.as_dict() {
                    let mut dictionary = dictionary.clone();
                    let id = match pages_object {
                        Some((id, ref old_dictionary)) => {
                            dictionary.extend(old_dictionary);
                            id
                        }
                        None => *object_id,
                    };
                    pages_object = Some((id, dictionary));
                }
            }
            b"Page" => {}     // Processed below, only the selected ones are kept
            b"Outlines" => {} // Bookmarks point at pages that may be gone
            b"Outline" => {}
            _ => {
                document.objects.insert(*object_id, object.clone());
            }
        }
    }

    let (pages_id, mut pages_dictionary) =
        pages_object.ok_or_else(|| anyhow!("Invalid PDF: Pages root not found"))?;
    let (catalog_id, catalog) =
        catalog_object.ok_or_else(|| anyhow!("Invalid PDF: Catalog root not found"))?;

    let mut kids = Vec::with_capacity(selectors.len());
    for (source, page, rotation) in selectors.iter() {
        let (object_id, dictionary) = source_pages
            .get(*source)
            .and_then(|pages| pages.get(*page))
            .ok_or_else(|| anyhow!("Page {} of source {} not found", page, source))?;

        let mut dictionary = dictionary.clone();
        dictionary.set("Parent", pages_id);
        if let Some(rotation) = rotation {
            set_rotation(&mut dictionary, *rotation);
        }

        kids.push(Object::Reference(*object_id));
        document
            .objects
            .insert(*object_id, Object::Dictionary(dictionary));
    }

    // Pages carry their own attributes now, the merged root must not leak any.
    for key in INHERITABLE {
        pages_dictionary.remove(key);
    }
    pages_dictionary.remove(b"Parent");
    pages_dictionary.set("Count", kids.len() as u32);
    pages_dictionary.set("Kids", kids);
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages_dictionary));

    let mut catalog = catalog
        .as_dict()
        .map_err(|_| anyhow!("Invalid PDF: Catalog is not a dictionary"))?
        .clone();
    catalog.set("Pages", pages_id);
    catalog.remove(b"Outlines");
    document
        .objects
        .insert(catalog_id, Object::Dictionary(catalog));

    document.trailer.set("Root", catalog_id);

    // Objects were inserted directly, `max_id` doesn't know about them.
    document.max_id = document
        .objects
        .keys()
        .map(|(id, _)| *id)
        .max()
        .unwrap_or(0);

    document.renumber_objects();
    document.prune_objects();

    Ok(document)
}

/// Sets the absolute rotation of the pages at the given 0-based positions.
pub(crate) fn rotate_pages(
    document: &mut Document,
    rotations: &BTreeMap<usize, Rotation>,
) -> Result<()> {
    let pages = document.get_pages();

    for (index, rotation) in rotations.iter() {
        let page_id = *pages
            .get(&(*index as u32 + 1))
            .ok_or_else(|| anyhow!("Page {} out of range ({} pages)", index, pages.len()))?;

        // Always explicit, an ancestor may carry its own /Rotate.
        let dictionary = document.get_object_mut(page_id)?.as_dict_mut()?;
        dictionary.set("Rotate", rotation.degrees() as i64);
    }

    Ok(())
}

pub(crate) fn encrypt(
    document: &mut Document,
    user_password: &str,
    owner_password: &str,
) -> Result<()> {
    // Key derivation needs a file identifier.
    if document.trailer.get(b"ID").is_err() {
        let id: [u8; 16] = rand::random();
        document.trailer.set(
            "ID",
            vec![
                Object::String(id.to_vec(), StringFormat::Hexadecimal),
                Object::String(id.to_vec(), StringFormat::Hexadecimal),
            ],
        );
    }

    let version = EncryptionVersion::V2 {
        document: &*document,
        owner_password,
        user_password,
        key_length: 128,
        permissions: Permissions::all(),
    };
    let state = EncryptionState::try_from(version)?;
    document.encrypt(&state)?;

    Ok(())
}

pub(crate) fn save(document: &mut Document, output: &Path, compress: bool) -> Result<()> {
    if compress {
        document.compress();
    }
    document
        .save(output)
        .with_context(|| format!("Couldn't save {}", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_load_skips_leading_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let clean = fixtures::write_pdf(dir.path(), "clean.pdf", &[0, 0]);

        let mut bytes = b"garbage\n".to_vec();
        bytes.extend(fs::read(&clean).unwrap());
        let dirty = dir.path().join("dirty.pdf");
        fs::write(&dirty, bytes).unwrap();

        let document = load_document(&dirty).unwrap();
        assert_eq!(2, document.get_pages().len());
    }

    #[test]
    fn test_load_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "hello").unwrap();

        let error = load_document(&path).unwrap_err();
        assert!(error.to_string().contains("Failed to find PDF header"));
    }

    #[test]
    fn test_page_rotations_follow_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf_with_root_rotation(dir.path(), "tree.pdf", &[0, 180], 90);
        let document = load_document(&path).unwrap();

        // Page 0 inherits from the root, page 1 overrides it.
        assert_eq!(vec![Rotation::R90, Rotation::R180], page_rotations(&document));
    }

    #[test]
    fn test_compose_orders_and_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let first = fixtures::write_pdf(dir.path(), "first.pdf", &[0, 0, 0]);
        let second = fixtures::write_pdf(dir.path(), "second.pdf", &[270]);

        let documents = vec![
            load_document(&first).unwrap(),
            load_document(&second).unwrap(),
        ];
        let selectors = vec![
            (0, 2, None),
            (1, 0, None),
            (0, 0, Some(Rotation::R90)),
        ];

        let mut document = compose(documents, &selectors).unwrap();
        let output = dir.path().join("out.pdf");
        save(&mut document, &output, true).unwrap();

        assert_eq!(
            vec!["Page 3", "Page 1", "Page 1"],
            fixtures::page_labels(&output)
        );
        assert_eq!(vec![0, 270, 90], fixtures::page_rotations(&output));
    }

    #[test]
    fn test_compose_keeps_inherited_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let tree = fixtures::write_pdf_with_root_rotation(dir.path(), "tree.pdf", &[0, 0], 90);
        let plain = fixtures::write_pdf(dir.path(), "plain.pdf", &[0]);

        let documents = vec![
            load_document(&plain).unwrap(),
            load_document(&tree).unwrap(),
        ];
        let mut document = compose(documents, &[(0, 0, None), (1, 1, None)]).unwrap();
        let output = dir.path().join("out.pdf");
        save(&mut document, &output, false).unwrap();

        assert_eq!(vec![0, 90], fixtures::page_rotations(&output));
    }

    #[test]
    fn test_compose_prunes_unused_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0, 0]);

        let document = compose(vec![load_document(&path).unwrap()], &[(0, 1, None)]).unwrap();

        let count_streams = document
            .objects
            .values()
            .filter(|object| matches!(object, Object::Stream(_)))
            .count();

        assert_eq!(1, document.get_pages().len());
        assert_eq!(1, count_streams);
    }

    #[test]
    fn test_compose_rejects_missing_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0]);

        let result = compose(vec![load_document(&path).unwrap()], &[(0, 5, None)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rotate_pages_overrides_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf_with_root_rotation(dir.path(), "tree.pdf", &[0, 0], 90);
        let mut document = load_document(&path).unwrap();

        let rotations = BTreeMap::from([(0, Rotation::R0), (1, Rotation::R180)]);
        rotate_pages(&mut document, &rotations).unwrap();

        assert_eq!(vec![Rotation::R0, Rotation::R180], page_rotations(&document));
    }

    #[test]
    fn test_page_sizes_follow_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0, 0]);
        let document = load_document(&path).unwrap();

        assert_eq!(
            vec![PageSize::new(612.0, 792.0), PageSize::new(612.0, 792.0)],
            page_sizes(&document)
        );
    }

    #[test]
    fn test_blank_document() {
        let document = blank_document(PageSize::new(300.0, 400.0));

        assert_eq!(1, document.get_pages().len());
        assert_eq!(vec![PageSize::new(300.0, 400.0)], page_sizes(&document));
        assert_eq!(vec![Rotation::R0], page_rotations(&document));
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0]);
        let mut document = load_document(&path).unwrap();
        assert!(read_metadata(&document).is_empty());

        let metadata = Metadata {
            title: Some("Procès-verbal".into()),
            author: Some("Board".into()),
            ..Metadata::default()
        };
        write_metadata(&mut document, &metadata);
        let output = dir.path().join("out.pdf");
        save(&mut document, &output, false).unwrap();

        assert_eq!(metadata, read_metadata(&load_document(&output).unwrap()));
    }

    #[test]
    fn test_decode_text() {
        assert_eq!("Café", decode_text(b"Caf\xe9"));
        assert_eq!("é", decode_text(&[0xFE, 0xFF, 0x00, 0xE9]));
    }

    #[test]
    fn test_rotate_pages_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixtures::write_pdf(dir.path(), "basic.pdf", &[0]);
        let mut document = load_document(&path).unwrap();

        let rotations = BTreeMap::from([(3, Rotation::R90)]);
        assert!(rotate_pages(&mut document, &rotations).is_err());
    }
}
