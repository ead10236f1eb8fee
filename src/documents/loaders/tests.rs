use super::*;
use std::io::Write;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn write_docx(dir: &TempDir, name: &str, body_xml: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let file = File::create(&path).expect("should create docx file");
    let mut writer = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    writer
        .start_file("[Content_Types].xml", options)
        .expect("should start content types entry");
    writer
        .write_all(br#"<?xml version="1.0"?><Types/>"#)
        .expect("should write content types");

    writer
        .start_file(DOCX_BODY_ENTRY, options)
        .expect("should start document entry");
    writer
        .write_all(body_xml.as_bytes())
        .expect("should write document body");

    writer.finish().expect("should finish archive");
    path
}

#[test]
fn plain_text_is_read_verbatim() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("notes.txt");
    fs::write(&path, "first line\n\nsecond line").expect("should write text file");

    let documents = load_plain_text(&path).expect("should load text");

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].text, "first line\n\nsecond line");
    assert_eq!(documents[0].metadata.title, "notes.txt");
    assert_eq!(documents[0].metadata.source, path.display().to_string());
    assert!(documents[0].metadata.page_id.is_none());
}

#[test]
fn plain_text_tolerates_invalid_utf8() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("latin1.txt");
    fs::write(&path, [b'c', b'a', b'f', 0xE9]).expect("should write bytes");

    let documents = load_plain_text(&path).expect("lossy decoding should succeed");

    assert!(documents[0].text.starts_with("caf"));
}

#[test]
fn missing_text_file_fails() {
    let dir = TempDir::new().expect("should create temp dir");
    assert!(load_plain_text(&dir.path().join("absent.txt")).is_err());
}

#[test]
fn docx_paragraphs_become_lines() {
    let dir = TempDir::new().expect("should create temp dir");
    let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space="preserve"> report</w:t></w:r></w:p>
    <w:p><w:r><w:t>Revenue &amp; costs</w:t><w:tab/><w:t>up</w:t></w:r></w:p>
    <w:p></w:p>
    <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
  </w:body>
</w:document>"#;
    let path = write_docx(&dir, "report.docx", body);

    let documents = load_docx(&path).expect("should load docx");

    assert_eq!(documents.len(), 1);
    assert_eq!(
        documents[0].text,
        "Quarterly report\nRevenue & costs\tup\nCell"
    );
    assert_eq!(documents[0].metadata.title, "report.docx");
}

#[test]
fn corrupt_docx_fails() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("broken.docx");
    fs::write(&path, "definitely not a zip archive").expect("should write file");

    let err = load_docx(&path).expect_err("corrupt docx should fail");
    assert!(err.to_string().contains("Not a valid DOCX archive"));
}

#[test]
fn docx_without_body_fails() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("empty.docx");
    let file = File::create(&path).expect("should create file");
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file(
            "other.xml",
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored),
        )
        .expect("should start entry");
    writer.write_all(b"<x/>").expect("should write entry");
    writer.finish().expect("should finish archive");

    assert!(load_docx(&path).is_err());
}

#[test]
fn garbage_pdf_fails() {
    let dir = TempDir::new().expect("should create temp dir");
    let path = dir.path().join("scan.pdf");
    fs::write(&path, "%PDF-nonsense").expect("should write file");

    assert!(load_pdf(&path).is_err());
}

#[test]
fn missing_pdf_fails() {
    let dir = TempDir::new().expect("should create temp dir");
    assert!(load_pdf(&dir.path().join("absent.pdf")).is_err());
}

#[test]
fn xml_entities_are_decoded() {
    assert_eq!(unescape_xml("a &lt;b&gt; &quot;c&quot;"), "a <b> \"c\"");
    assert_eq!(unescape_xml("&#65;&#x42;"), "AB");
    assert_eq!(unescape_xml("tom &unknown; jerry"), "tom &unknown; jerry");
    assert_eq!(unescape_xml("dangling & end"), "dangling & end");
}
