//! Source file text extraction.
//!
//! The ingestion CLI accepts plain text (`.txt`, `.md`), PDF, and DOCX.
//! Extraction happens before normalization: this module only turns bytes
//! into UTF-8 text, and any unsupported extension or corrupt file is a
//! source-format error that aborts that ingestion.

use std::io::Read;
use std::path::Path;

use anyhow::Result;

use crate::errors::PipelineError;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Read a source file and return its plain text, dispatching on extension.
pub fn read_source(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" | "markdown" => std::fs::read_to_string(path).map_err(|e| {
            PipelineError::source_format(format!("cannot read {}: {}", path.display(), e))
        }),
        "pdf" => {
            let bytes = read_bytes(path)?;
            extract_pdf(&bytes)
        }
        "docx" => {
            let bytes = read_bytes(path)?;
            extract_docx(&bytes)
        }
        "" => Err(PipelineError::source_format(format!(
            "{} has no file extension",
            path.display()
        ))),
        other => Err(PipelineError::source_format(format!(
            "unsupported file extension: .{} (supported: txt, md, pdf, docx)",
            other
        ))),
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        PipelineError::source_format(format!("cannot read {}: {}", path.display(), e))
    })
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PipelineError::source_format(format!("PDF extraction failed: {}", e)))
}

/// Pull `word/document.xml` out of the DOCX archive and collect the text of
/// every `w:t` element.
fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| PipelineError::source_format(format!("DOCX is not a valid archive: {}", e)))?;

    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| PipelineError::source_format("DOCX missing word/document.xml"))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| PipelineError::source_format(format!("DOCX read failed: {}", e)))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(PipelineError::source_format(
            "word/document.xml exceeds size limit",
        ));
    }

    collect_text_elements(&doc_xml)
}

fn collect_text_elements(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                } else if name.as_ref() == b"p" && !out.is_empty() {
                    // paragraph boundary
                    out.push_str("\n\n");
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(PipelineError::source_format(format!(
                    "DOCX XML parse failed: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
