use crate::adapter::{DocumentAdapter, PdfAdapter};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};
use std::path::{Path, PathBuf};

pub fn write_pdf(dir: &Path, name: &str, rotations: &[i64]) -> PathBuf {
    write(dir, name, rotations, None)
}

/// Same as [`write_pdf`] with a `/Rotate` on the page tree root; pages with a
/// rotation of 0 inherit it.
pub fn write_pdf_with_root_rotation(
    dir: &Path,
    name: &str,
    rotations: &[i64],
    root_rotation: i64,
) -> PathBuf {
    write(dir, name, rotations, Some(root_rotation))
}

fn write(dir: &Path, name: &str, rotations: &[i64], root_rotation: Option<i64>) -> PathBuf {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut page_ids = Vec::new();
    for (index, rotation) in rotations.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        format!("Page {}", index + 1).into_bytes(),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if *rotation != 0 {
            page.set("Rotate", *rotation);
        }
        page_ids.push(doc.add_object(page));
    }

    let mut pages = dictionary! {
        "Type" => "Pages",
        "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        "Count" => page_ids.len() as u32,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    };
    if let Some(rotation) = root_rotation {
        pages.set("Rotate", rotation);
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).unwrap();
    path
}

/// The "Page n" text of every page, in document order.
pub fn page_labels(path: &Path) -> Vec<String> {
    let document = Document::load(path).unwrap();
    document
        .get_pages()
        .into_values()
        .map(|page_id| {
            let content = document.get_page_content(page_id).unwrap();
            let text = String::from_utf8_lossy(&content).to_string();
            let start = text.find("(Page ").unwrap() + 1;
            let end = start + text[start..].find(')').unwrap();
            text[start..end].to_string()
        })
        .collect()
}

pub fn page_rotations(path: &Path) -> Vec<u16> {
    PdfAdapter::default()
        .open(path)
        .unwrap()
        .rotations
        .iter()
        .map(|rotation| rotation.degrees())
        .collect()
}
