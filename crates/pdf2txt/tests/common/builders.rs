//! Builders for test inputs.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};

/// Builds a PDF with one page per entry; `\n` separates lines on a page.
/// An empty entry gives a page with no text layer, like a scan.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for page in pages {
        let mut content = String::from("BT /F1 11 Tf 50 760 Td 14 TL ");
        for line in page.lines().filter(|l| !l.is_empty()) {
            content.push_str(&format!("({}) Tj T* ", line));
        }
        content.push_str("ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    bytes
}

/// A digitally authored page whose text layer is well over the OCR threshold.
pub fn authored_page() -> String {
    (1..=5)
        .map(|i| format!("Article {}. Le preneur s'engage a payer le loyer convenu.", i))
        .collect::<Vec<_>>()
        .join("\n")
}
