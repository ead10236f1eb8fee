use super::*;
use tempfile::TempDir;

#[test]
fn kind_follows_extension() {
    assert_eq!(SourceKind::for_path(Path::new("a/report.pdf")), SourceKind::Pdf);
    assert_eq!(SourceKind::for_path(Path::new("REPORT.PDF")), SourceKind::Pdf);
    assert_eq!(SourceKind::for_path(Path::new("memo.docx")), SourceKind::Docx);
    assert_eq!(SourceKind::for_path(Path::new("notes.txt")), SourceKind::PlainText);
    assert_eq!(SourceKind::for_path(Path::new("data.csv")), SourceKind::PlainText);
    assert_eq!(SourceKind::for_path(Path::new("Makefile")), SourceKind::PlainText);
}

#[test]
fn notion_sources_ignore_extension() {
    let source = Source::notion_page("page.pdf");

    assert_eq!(source.kind(), SourceKind::NotionPage);
    assert_eq!(source.id(), "notion_page_page.pdf");
}

#[test]
fn every_file_kind_has_a_loader() {
    assert!(file_loader(SourceKind::Pdf).is_some());
    assert!(file_loader(SourceKind::Docx).is_some());
    assert!(file_loader(SourceKind::PlainText).is_some());
    assert!(file_loader(SourceKind::NotionPage).is_none());
}

#[test]
fn load_file_dispatches_on_extension() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("unknown.log");
    std::fs::write(&path, "log line").expect("should write file");

    let documents = load_file(&path).expect("unknown extensions load as text");

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].text, "log line");
}

#[test]
fn file_source_id_is_its_path() {
    let source = Source::file("/tmp/upload/temp_notes.txt");

    assert_eq!(source.id(), "/tmp/upload/temp_notes.txt");
    assert_eq!(source.to_string(), "/tmp/upload/temp_notes.txt");
    assert_eq!(source.kind(), SourceKind::PlainText);
}
