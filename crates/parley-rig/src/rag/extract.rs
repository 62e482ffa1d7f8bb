//! Format-dispatched text extraction for uploaded files.

use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use quick_xml::events::{BytesRef, Event};

use super::Document;
use crate::{Error, Result, TRACING_TARGET_RAG};

/// File formats understood by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    /// Legacy binary Word documents. Not supported.
    Doc,
    Text,
    Csv,
    Spreadsheet,
}

impl DocumentFormat {
    /// Detects the format from the MIME type, then from the file extension.
    ///
    /// Anything unrecognised is read as text.
    pub fn detect(mime_type: &str, filename: &str) -> Self {
        Self::from_mime(mime_type)
            .or_else(|| Self::from_extension(filename))
            .unwrap_or(Self::Text)
    }

    fn from_mime(mime_type: &str) -> Option<Self> {
        let format = match mime_type {
            "application/pdf" => Self::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Self::Docx
            }
            "application/msword" => Self::Doc,
            "text/plain" | "text/markdown" => Self::Text,
            "text/csv" => Self::Csv,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.ms-excel" => Self::Spreadsheet,
            _ => return None,
        };
        Some(format)
    }

    fn from_extension(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        let format = match extension.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "doc" => Self::Doc,
            "txt" | "md" | "markdown" => Self::Text,
            "csv" => Self::Csv,
            "xlsx" | "xls" => Self::Spreadsheet,
            _ => return None,
        };
        Some(format)
    }
}

/// Reads a stored file and extracts its documents.
///
/// Parsing runs on the blocking thread pool.
#[tracing::instrument(skip(path), target = TRACING_TARGET_RAG, fields(path = %path.display()))]
pub async fn load(path: &Path, mime_type: &str) -> Result<Vec<Document>> {
    let data = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_owned();
    let mime_type = mime_type.to_owned();

    let documents =
        tokio::task::spawn_blocking(move || extract_bytes(&data, &mime_type, &filename))
            .await
            .map_err(|e| Error::extraction(format!("extraction task failed: {e}")))??;

    tracing::debug!(
        target: TRACING_TARGET_RAG,
        documents = documents.len(),
        "Documents extracted"
    );

    Ok(documents)
}

/// Extracts documents from file contents.
pub fn extract_bytes(data: &[u8], mime_type: &str, filename: &str) -> Result<Vec<Document>> {
    let format = DocumentFormat::detect(mime_type, filename);
    let documents = match format {
        DocumentFormat::Pdf => vec![Document::new(extract_pdf(data)?)],
        DocumentFormat::Docx => vec![Document::new(extract_docx(data)?)],
        DocumentFormat::Doc => {
            return Err(Error::extraction(
                "legacy .doc files are not supported, convert to .docx",
            ));
        }
        DocumentFormat::Text => vec![Document::new(String::from_utf8_lossy(data))],
        DocumentFormat::Csv => extract_csv(data)?,
        DocumentFormat::Spreadsheet => extract_spreadsheet(data)?,
    };

    Ok(documents
        .into_iter()
        .map(|document| document.with_metadata("source", filename))
        .collect())
}

fn extract_pdf(data: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(data)
        .map_err(|e| Error::extraction(format!("failed to read PDF: {e}")))
}

fn extract_docx(data: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::extraction(format!("failed to open DOCX archive: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::extraction(format!("DOCX has no document body: {e}")))?
        .read_to_string(&mut xml)?;

    docx_text(&xml)
}

/// Collects the `w:t` runs of a WordprocessingML body, one line per paragraph.
fn docx_text(xml: &str) -> Result<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_run => {
                let decoded = t
                    .decode()
                    .map_err(|e| Error::extraction(format!("invalid DOCX text: {e}")))?;
                text.push_str(&decoded);
            }
            Ok(Event::GeneralRef(r)) if in_run => push_entity(&mut text, &r),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::extraction(format!(
                    "malformed DOCX at {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    Ok(text.trim_end().to_owned())
}

fn push_entity(text: &mut String, entity: &BytesRef<'_>) {
    if let Ok(Some(ch)) = entity.resolve_char_ref() {
        text.push(ch);
    } else if let Ok(name) = entity.decode()
        && let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name)
    {
        text.push_str(resolved);
    }
}

/// One document per CSV row, each column rendered as `header: value`.
fn extract_csv(data: &[u8]) -> Result<Vec<Document>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let headers = reader
        .headers()
        .map_err(|e| Error::extraction(format!("failed to read CSV header: {e}")))?
        .clone();

    let mut documents = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| Error::extraction(format!("invalid CSV row: {e}")))?;
        let content = record
            .iter()
            .enumerate()
            .map(|(column, value)| {
                format!("{}: {}", header_name(headers.get(column), column), value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        documents.push(Document::new(content).with_metadata("line", index + 1));
    }

    Ok(documents)
}

/// One document per sheet. Data rows render as `header: value | header: value`.
fn extract_spreadsheet(data: &[u8]) -> Result<Vec<Document>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(data.to_vec()))
        .map_err(|e| Error::extraction(format!("failed to open spreadsheet: {e}")))?;

    let mut documents = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| Error::extraction(format!("failed to read sheet {sheet}: {e}")))?;

        let mut rows = range.rows().filter(|row| !row.iter().all(is_blank));
        let headers: Vec<String> = rows
            .next()
            .map(|row| row.iter().map(|cell| cell.to_string().trim().to_owned()).collect())
            .unwrap_or_default();

        let mut row_count = 0usize;
        let lines: Vec<String> = rows
            .inspect(|_| row_count += 1)
            .map(|row| render_row(&headers, row))
            .filter(|line| !line.is_empty())
            .collect();

        let content = if lines.is_empty() {
            "(empty sheet)".to_owned()
        } else {
            lines.join("\n")
        };

        documents.push(
            Document::new(content)
                .with_metadata("sheet", sheet.as_str())
                .with_metadata("row_count", row_count)
                .with_metadata("column_count", headers.len()),
        );
    }

    Ok(documents)
}

fn render_row(headers: &[String], row: &[Data]) -> String {
    row.iter()
        .enumerate()
        .filter_map(|(column, cell)| {
            let value = cell.to_string();
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            let header = header_name(headers.get(column).map(String::as_str), column);
            Some(format!("{header}: {value}"))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn header_name(header: Option<&str>, column: usize) -> String {
    match header.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => format!("Column{}", column + 1),
    }
}

fn is_blank(cell: &Data) -> bool {
    matches!(cell, Data::Empty) || cell.to_string().trim().is_empty()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn detects_by_mime_then_extension() {
        assert_eq!(
            DocumentFormat::detect("application/pdf", "a.txt"),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::detect("application/octet-stream", "Report.XLSX"),
            DocumentFormat::Spreadsheet
        );
        assert_eq!(
            DocumentFormat::detect("application/octet-stream", "notes"),
            DocumentFormat::Text
        );
    }

    #[test]
    fn text_is_read_verbatim() {
        let documents = extract_bytes(b"Revenue was $5M in 2023.", "text/plain", "r.txt").unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].content, "Revenue was $5M in 2023.");
        assert_eq!(documents[0].metadata_str("source"), Some("r.txt"));
    }

    #[test]
    fn csv_rows_become_documents() {
        let data = b"name,city\nAda,London\nLinus,\n";
        let documents = extract_bytes(data, "text/csv", "people.csv").unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].content, "name: Ada\ncity: London");
        assert_eq!(documents[1].content, "name: Linus\ncity: ");
    }

    #[test]
    fn legacy_doc_is_unsupported() {
        let error = extract_bytes(b"\xd0\xcf", "application/msword", "old.doc")
            .err()
            .unwrap();
        assert!(matches!(error, Error::Extraction(_)));
    }

    #[test]
    fn docx_paragraphs_and_entities() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>A &amp; B</w:t></w:r></w:p>
        </w:body></w:document>"#;
        assert_eq!(docx_text(xml).unwrap(), "Hello world\nA & B");
    }

    #[test]
    fn docx_archive_is_read() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer
                .write_all(b"<w:document><w:body><w:p><w:r><w:t>Body</w:t></w:r></w:p></w:body></w:document>")
                .unwrap();
            writer.finish().unwrap();
        }

        let documents = extract_bytes(
            buffer.get_ref(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "a.docx",
        )
        .unwrap();
        assert_eq!(documents[0].content, "Body");
    }

    #[test]
    fn spreadsheet_rows_render_with_header_fallback() {
        let headers = vec!["Name".to_owned(), String::new()];
        let row = vec![
            Data::String("Ada".into()),
            Data::Int(36),
            Data::Empty,
        ];
        assert_eq!(render_row(&headers, &row), "Name: Ada | Column2: 36");
        assert_eq!(render_row(&headers, &[Data::Empty]), "");
    }
}
