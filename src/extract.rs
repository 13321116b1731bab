//! Plain-text extraction for the indexable upload formats.
//!
//! | Format | Output |
//! |--------|--------|
//! | txt | bytes decoded as UTF-8 (lossy) |
//! | csv | column names joined by spaces, then the aligned table |
//! | docx | paragraph texts joined by `\n` |
//! | pdf | per-page text joined by `\n`, blank pages skipped |
//!
//! Extraction never panics; failures come back as [`ExtractError`].

use std::io::Read;

use quick_xml::events::Event;
use search_gateway_core::models::FileType;

use crate::tabular;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type for indexing: {0}")]
    Unsupported(FileType),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error(transparent)]
    Table(#[from] tabular::TableError),
}

/// Extracts the searchable text of an upload.
pub fn extract_text(bytes: &[u8], file_type: FileType) -> Result<String, ExtractError> {
    match file_type {
        FileType::Txt => Ok(String::from_utf8_lossy(bytes).into_owned()),
        FileType::Csv => Ok(tabular::read_csv(bytes)?.to_text()),
        FileType::Docx => extract_docx(bytes),
        FileType::Pdf => extract_pdf(bytes),
        other => Err(ExtractError::Unsupported(other)),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    docx_paragraphs(&doc_xml).map(|paras| paras.join("\n"))
}

/// Text of each `<w:p>`, in document order. Tabs and breaks become whitespace.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_t = true,
                b"p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push(' '),
                // A self-closing paragraph is an empty line.
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_is_lossy_utf8() {
        let text = extract_text(b"caf\xc3\xa9 \xff", FileType::Txt).unwrap();
        assert!(text.starts_with("café "));
    }

    #[test]
    fn csv_flattens_to_header_then_table() {
        let text = extract_text(b"host,site\nr1,ams\n", FileType::Csv).unwrap();
        assert!(text.starts_with("host site\n"));
        assert!(text.contains("r1  ams"));
    }

    #[test]
    fn spreadsheets_are_not_indexable() {
        let err = extract_text(b"", FileType::Xlsx).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(FileType::Xlsx)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", FileType::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text(b"not a zip", FileType::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_paragraphs_keep_runs_together() {
        let xml = br#"<w:document xmlns:w="x"><w:body>
            <w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p>
            <w:p/>
            <w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let paras = docx_paragraphs(xml).unwrap();
        assert_eq!(paras, vec!["Hello world", "", "a\tb"]);
    }
}
