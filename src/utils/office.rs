//! Converters for Office Open XML documents (docx, xlsx, pptx).
//!
//! All three formats are zip containers of XML parts. Text runs are pulled
//! out with quick-xml; spreadsheets are rendered as Markdown tables and
//! slides as one section per slide.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::io::Cursor;

use crate::utils::extract::{read_zip_part, Converter, DocumentFormat, ExtractionError};

/// Upper bound for a single decompressed XML part
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractionError> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::Failed(format!("not a zip container: {}", e)))
}

fn required_part(archive: &mut Archive<'_>, name: &str) -> Result<String, ExtractionError> {
    read_zip_part(archive, name, MAX_PART_BYTES)?
        .ok_or_else(|| ExtractionError::Failed(format!("missing part {}", name)))
}

fn xml_error(reader: &Reader<&[u8]>, err: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Failed(format!(
        "XML error at position {}: {}",
        reader.buffer_position(),
        err
    ))
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Numbered parts like `ppt/slides/slide12.xml`, in numeric order
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<(u32, String)> {
    let mut parts: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name.strip_prefix(prefix)?.strip_suffix(".xml")?.parse().ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    parts.sort();
    parts
}

/// Squeeze blank lines and trim line ends
fn tidy(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Paragraph text of a WordprocessingML or DrawingML body.
///
/// `t` elements hold text; the end of a `p` element ends a line.
fn paragraph_text(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;
    let mut in_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"r" => in_run = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => in_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => out.push('\n'),
                b"tab" if in_run => out.push('\t'),
                b"br" | b"cr" if in_run => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| xml_error(&reader, e))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(&reader, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Word documents
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxConverter;

impl Converter for DocxConverter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn convert(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = open_archive(bytes)?;
        let body = required_part(&mut archive, "word/document.xml")?;
        Ok(tidy(&paragraph_text(&body)?))
    }
}

/// PowerPoint presentations
#[derive(Debug, Clone, Copy, Default)]
pub struct PptxConverter;

impl Converter for PptxConverter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pptx
    }

    fn convert(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = open_archive(bytes)?;
        let slides = numbered_parts(&archive, "ppt/slides/slide");
        if slides.is_empty() {
            return Err(ExtractionError::Failed("presentation has no slides".to_string()));
        }

        let mut sections = Vec::with_capacity(slides.len());
        for (number, part) in slides {
            let xml = required_part(&mut archive, &part)?;
            let text = tidy(&paragraph_text(&xml)?);
            sections.push(format!("## Slide {}\n\n{}", number, text));
        }
        Ok(sections.join("\n\n"))
    }
}

/// Excel workbooks
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxConverter;

impl Converter for XlsxConverter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Xlsx
    }

    fn convert(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut archive = open_archive(bytes)?;

        let shared = match read_zip_part(&mut archive, "xl/sharedStrings.xml", MAX_PART_BYTES)? {
            Some(xml) => shared_strings(&xml)?,
            None => Vec::new(),
        };
        let names = match read_zip_part(&mut archive, "xl/workbook.xml", MAX_PART_BYTES)? {
            Some(xml) => sheet_names(&xml)?,
            None => Vec::new(),
        };

        let sheets = numbered_parts(&archive, "xl/worksheets/sheet");
        let mut sections = Vec::new();
        for (index, (number, part)) in sheets.into_iter().enumerate() {
            let xml = required_part(&mut archive, &part)?;
            let rows = sheet_rows(&xml, &shared)?;
            if rows.is_empty() {
                continue;
            }
            let title = names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("Sheet{}", number));
            sections.push(format!("## {}\n\n{}", title, markdown_table(&rows)));
        }
        Ok(sections.join("\n\n"))
    }
}

/// Shared string table; phonetic guides (`rPh`) are skipped
fn shared_strings(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(t)) if in_text && !in_phonetic => {
                current.push_str(&t.unescape().map_err(|e| xml_error(&reader, e))?);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(&reader, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn sheet_names(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut names = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                names.push(attr(&e, b"name").unwrap_or_default());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(&reader, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

/// Last column Excel can address (`XFD`)
const MAX_COLUMNS: usize = 16_384;

/// Upper bound for rows times widest row in one rendered sheet
const MAX_SHEET_CELLS: usize = 1_000_000;

/// Zero-based column index of a cell reference like `AB12`.
///
/// `Ok(None)` means the reference carries no column letters.
fn column_index(reference: &str) -> Result<Option<usize>, ExtractionError> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return Ok(None);
    }
    let number = letters.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
    });
    match number {
        Some(n) if n <= MAX_COLUMNS => Ok(Some(n - 1)),
        _ => Err(ExtractionError::Failed(format!(
            "cell reference {} is beyond column XFD",
            reference
        ))),
    }
}

struct CellState {
    column: usize,
    kind: String,
    value: String,
}

fn sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut width = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    let column = match attr(&e, b"r") {
                        Some(r) => column_index(&r)?,
                        None => None,
                    }
                    .unwrap_or(row.len());
                    if column >= MAX_COLUMNS {
                        return Err(ExtractionError::Failed(format!(
                            "row is wider than {} columns",
                            MAX_COLUMNS
                        )));
                    }
                    cell = Some(CellState {
                        column,
                        kind: attr(&e, b"t").unwrap_or_default(),
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(state) = cell.take() {
                        let value = resolve_cell(&state, shared);
                        if row.len() <= state.column {
                            row.resize(state.column + 1, String::new());
                        }
                        row[state.column] = value;
                    }
                }
                b"row" => {
                    if row.iter().any(|v| !v.is_empty()) {
                        width = width.max(row.len());
                        rows.push(std::mem::take(&mut row));
                        if rows.len().saturating_mul(width) > MAX_SHEET_CELLS {
                            return Err(ExtractionError::Failed(format!(
                                "sheet exceeds {} cells",
                                MAX_SHEET_CELLS
                            )));
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_value => {
                if let Some(state) = cell.as_mut() {
                    state.value.push_str(&t.unescape().map_err(|e| xml_error(&reader, e))?);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(&reader, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn resolve_cell(state: &CellState, shared: &[String]) -> String {
    match state.kind.as_str() {
        "s" => state
            .value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        "b" => match state.value.trim() {
            "1" => "TRUE".to_string(),
            _ => "FALSE".to_string(),
        },
        _ => state.value.clone(),
    }
}

fn markdown_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let render = |row: &Vec<String>| {
        let cells: Vec<String> = (0..width)
            .map(|i| {
                row.get(i)
                    .map(|v| v.replace('|', "\\|").replace('\n', " "))
                    .unwrap_or_default()
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    if let Some((header, body)) = rows.split_first() {
        lines.push(render(header));
        lines.push(format!("|{}", " --- |".repeat(width)));
        lines.extend(body.iter().map(render));
    }
    lines.join("\n")
}
