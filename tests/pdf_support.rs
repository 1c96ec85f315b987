//! PDF ingestion against real PDF files synthesized with lopdf, covering
//! metadata derivation, idempotence, and rejection of unusable documents.

use std::path::Path;
use tempfile::TempDir;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use raia_assist::config::Config;
use raia_assist::corpus;
use raia_assist::models::Category;
use raia_assist::pdf::{self, PdfOptions};
use raia_assist::progress::NoProgress;

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.workspace.dir = dir.to_path_buf();
    config.db.path = dir.join("raia.db");
    config.chunk.target_words = 60;
    config
}

/// Build a single-page PDF with one text line per entry in `lines`.
fn write_pdf(path: &Path, lines: &[&str]) {
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

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("TL", vec![14.into()]),
        Operation::new("Td", vec![50.into(), 750.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

const HANDBOOK_LINES: &[&str] = &[
    "The Social Health Authority handbook explains member registration.",
    "Every Kenyan resident must register with SHA and pay contributions.",
    "Dependants are covered under the principal member's registration.",
    "Claims are submitted by the hospital, not by the member.",
];

#[test]
fn converts_pdf_with_derived_metadata() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let pdf_path = dir.path().join("sha_member-handbook.pdf");
    write_pdf(&pdf_path, HANDBOOK_LINES);

    let outcome = pdf::convert_pdf(&config, &pdf_path, &PdfOptions::default(), false).unwrap();
    assert!(!outcome.written.is_empty());
    assert_eq!(outcome.skipped, 0);

    let files = corpus::scan_corpus(&config.corpus_dir()).unwrap();
    assert_eq!(files.len(), outcome.written.len());
    let first = &files[0];
    assert!(first
        .meta
        .title
        .as_deref()
        .unwrap()
        .starts_with("Sha Member Handbook"));
    assert_eq!(
        first.meta.source.as_deref(),
        Some("PDF: sha_member-handbook.pdf")
    );
    let tags = first.meta.tags.as_ref().unwrap();
    assert_eq!(tags[0], "pdf_import");
    assert!(tags.contains(&"sha".to_string()));
    assert!(first.body.contains("member registration"));
}

#[test]
fn explicit_options_override_derivation() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let pdf_path = dir.path().join("attachment_0017.pdf");
    write_pdf(&pdf_path, HANDBOOK_LINES);

    let opts = PdfOptions {
        title: Some("SHA Member Handbook 2026".to_string()),
        category: Some(Category::MinistryFaq),
        source: Some("https://sha.go.ke/handbook.pdf".to_string()),
        tags: Some(vec!["sha".to_string(), "handbook".to_string()]),
    };
    pdf::convert_pdf(&config, &pdf_path, &opts, false).unwrap();

    let files = corpus::scan_corpus(&config.corpus_dir()).unwrap();
    let first = &files[0];
    assert!(first
        .meta
        .title
        .as_deref()
        .unwrap()
        .contains("SHA Member Handbook 2026"));
    assert_eq!(first.meta.category.as_deref(), Some("ministry_faq"));
    assert_eq!(
        first.meta.source.as_deref(),
        Some("https://sha.go.ke/handbook.pdf")
    );
    assert_eq!(
        first.meta.tags.as_ref().unwrap(),
        &vec!["sha".to_string(), "handbook".to_string()]
    );
}

#[test]
fn reconversion_skips_unless_forced() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let pdf_path = dir.path().join("sha_member-handbook.pdf");
    write_pdf(&pdf_path, HANDBOOK_LINES);

    let first = pdf::convert_pdf(&config, &pdf_path, &PdfOptions::default(), false).unwrap();
    assert!(!first.written.is_empty());
    assert!(pdf::already_converted(&config, &pdf_path));

    let second = pdf::convert_pdf(&config, &pdf_path, &PdfOptions::default(), false).unwrap();
    assert!(second.written.is_empty());
    assert_eq!(second.skipped, first.written.len());

    let forced = pdf::convert_pdf(&config, &pdf_path, &PdfOptions::default(), true).unwrap();
    assert_eq!(forced.written.len(), first.written.len());
}

#[test]
fn near_empty_pdf_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let pdf_path = dir.path().join("scanned.pdf");
    write_pdf(&pdf_path, &["x"]);

    let err = pdf::convert_pdf(&config, &pdf_path, &PdfOptions::default(), false).unwrap_err();
    assert!(
        err.to_string().contains("too short or empty"),
        "unexpected error: {:#}",
        err
    );
    assert!(!config.corpus_dir().join("scanned.md").exists());
}

#[test]
fn directory_mode_detects_categories_per_file() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let pdf_dir = dir.path().join("pdfs");
    std::fs::create_dir_all(&pdf_dir).unwrap();

    write_pdf(&pdf_dir.join("sha_faq.pdf"), HANDBOOK_LINES);
    write_pdf(&pdf_dir.join("health_act_legal.pdf"), HANDBOOK_LINES);
    // Non-PDF files in the directory are ignored.
    std::fs::write(pdf_dir.join("notes.txt"), "not a pdf").unwrap();

    pdf::run_pdf(&config, &pdf_dir, &PdfOptions::default(), false, &NoProgress).unwrap();

    let files = corpus::scan_corpus(&config.corpus_dir()).unwrap();
    let category_of = |stem: &str| {
        files
            .iter()
            .find(|f| f.filename.starts_with(stem))
            .unwrap_or_else(|| panic!("no corpus file for {}", stem))
            .meta
            .category
            .clone()
            .unwrap()
    };
    assert_eq!(category_of("sha_faq"), "ministry_faq");
    assert_eq!(category_of("health_act_legal"), "legal_snippet");
}

#[test]
fn filename_helpers_cover_awkward_names() {
    assert_eq!(pdf::safe_stem("SHA Handbook (final) v2!"), "sha_handbook_final_v2");
    assert_eq!(pdf::derive_title("sha_member-handbook"), "Sha Member Handbook");
    assert_eq!(pdf::detect_category("benefits_faq"), Some(Category::MinistryFaq));
    assert_eq!(pdf::detect_category("random_notes"), None);
}
