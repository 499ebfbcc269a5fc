//! Per-format text extraction dispatch.
//!
//! `extract_text` never fails past its boundary: any internal failure is a
//! tagged [`Extraction::Failed`] internally and collapses to a filename
//! placeholder at the outward edge, so one corrupt file can't abort a batch.
//!
//! Dispatch is by file extension first, sniffed content second. Every handler
//! applies a bounded read (page/row/byte caps) so extraction cost stays
//! roughly constant regardless of document size; the caps are a latency
//! ceiling, not a correctness requirement.

use std::io::Read;
use std::path::Path;

use tracing::warn;

/// Output cap applied to every handler, in characters.
const MAX_TEXT_CHARS: usize = 20_000;
/// Rows scanned from a tabular input.
const CSV_MAX_ROWS: usize = 50;
/// Slides scanned from a presentation.
const PPTX_MAX_SLIDES: usize = 20;
/// Sheets scanned from a workbook.
const XLSX_MAX_SHEETS: usize = 10;
/// Entries listed from an archive manifest.
const ZIP_MAX_ENTRIES: usize = 20;
/// Decompressed bytes read from any single ZIP entry (zip-bomb guard).
const MAX_ZIP_ENTRY_BYTES: u64 = 20 * 1024 * 1024;

/// Tagged extraction result. `Failed` keeps the reason for logging; it is
/// collapsed to placeholder text only at the outward boundary.
#[derive(Debug)]
pub enum Extraction {
    Ok(String),
    Failed(String),
}

/// Coarse file-type label stored on the FileRecord.
pub fn file_type(path: &Path) -> &'static str {
    match extension(path).as_str() {
        "pdf" => "pdf",
        "docx" | "doc" | "odt" | "rtf" | "epub" => "document",
        "xlsx" | "xls" | "ods" | "csv" => "spreadsheet",
        "pptx" | "ppt" | "odp" => "presentation",
        "txt" | "md" => "text",
        "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "tif" | "gif" | "webp" => "image",
        "wav" | "mp3" | "m4a" | "flac" | "ogg" | "aac" => "audio",
        "mp4" | "avi" | "mov" | "mkv" => "video",
        "py" | "js" | "java" | "cpp" | "c" | "h" | "cs" | "rb" | "go" | "rs" => "code",
        "html" | "css" | "xml" => "web",
        "json" | "yaml" | "yml" | "sql" | "toml" => "data",
        "zip" | "tar" | "gz" | "7z" => "archive",
        _ => "other",
    }
}

/// Extract plain text from a file. Never returns an error: failures collapse
/// to a `"File: <name>"` placeholder so ingestion proceeds.
pub fn extract_text(path: &Path) -> String {
    match extract_inner(path) {
        Extraction::Ok(text) if !text.trim().is_empty() => truncate_chars(&text, MAX_TEXT_CHARS),
        Extraction::Ok(_) => placeholder(path),
        Extraction::Failed(reason) => {
            warn!(path = %path.display(), %reason, "extraction failed, using placeholder");
            placeholder(path)
        }
    }
}

fn placeholder(path: &Path) -> String {
    format!("File: {}", file_name(path))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn extract_inner(path: &Path) -> Extraction {
    match extension(path).as_str() {
        "pdf" => extract_pdf(path),
        "docx" => extract_docx(path),
        "pptx" => extract_pptx(path),
        "xlsx" => extract_xlsx(path),
        "csv" => extract_csv(path),
        "zip" => extract_zip_manifest(path),
        "png" | "jpg" | "jpeg" | "bmp" | "tiff" | "tif" | "gif" | "webp" => extract_image(path),
        "wav" | "mp3" | "m4a" | "flac" | "ogg" | "aac" => {
            Extraction::Ok(format!("Audio file: {}", file_name(path)))
        }
        "mp4" | "avi" | "mov" | "mkv" => Extraction::Ok(format!("Video file: {}", file_name(path))),
        "txt" | "md" | "py" | "js" | "java" | "cpp" | "c" | "h" | "cs" | "rb" | "go" | "rs"
        | "html" | "css" | "xml" | "json" | "yaml" | "yml" | "sql" | "toml" | "tex" | "bib" => {
            extract_plain(path)
        }
        // No known extension: sniff leading bytes, then try UTF-8 text.
        _ => match sniff(path) {
            Some(Sniffed::Pdf) => extract_pdf(path),
            Some(Sniffed::Zip) => extract_zip_manifest(path),
            _ => extract_plain(path),
        },
    }
}

enum Sniffed {
    Pdf,
    Zip,
}

fn sniff(path: &Path) -> Option<Sniffed> {
    let mut magic = [0u8; 4];
    let mut f = std::fs::File::open(path).ok()?;
    f.read_exact(&mut magic).ok()?;
    if &magic == b"%PDF" {
        Some(Sniffed::Pdf)
    } else if magic.starts_with(b"PK") {
        Some(Sniffed::Zip)
    } else {
        None
    }
}

fn extract_plain(path: &Path) -> Extraction {
    match std::fs::read(path) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            Extraction::Ok(truncate_chars(&text, MAX_TEXT_CHARS))
        }
        Err(e) => Extraction::Failed(format!("read failed: {}", e)),
    }
}

fn extract_pdf(path: &Path) -> Extraction {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => return Extraction::Failed(format!("read failed: {}", e)),
    };
    match pdf_extract::extract_text_from_mem(&bytes) {
        Ok(text) => Extraction::Ok(truncate_chars(&text, MAX_TEXT_CHARS)),
        Err(e) => Extraction::Failed(format!("pdf extraction failed: {}", e)),
    }
}

/// OCR via an external `tesseract` binary. The OCR engine is a collaborator,
/// not something this crate implements; a missing binary or OCR failure is an
/// ordinary extraction failure.
fn extract_image(path: &Path) -> Extraction {
    let output = std::process::Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .output();
    match output {
        Ok(out) if out.status.success() => {
            Extraction::Ok(String::from_utf8_lossy(&out.stdout).to_string())
        }
        Ok(out) => Extraction::Failed(format!(
            "tesseract exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )),
        Err(e) => Extraction::Failed(format!("tesseract not available: {}", e)),
    }
}

fn extract_csv(path: &Path) -> Extraction {
    let mut reader = match csv::ReaderBuilder::new().flexible(true).from_path(path) {
        Ok(r) => r,
        Err(e) => return Extraction::Failed(format!("csv open failed: {}", e)),
    };
    let mut lines = Vec::new();
    if let Ok(headers) = reader.headers() {
        lines.push(headers.iter().collect::<Vec<_>>().join("\t"));
    }
    for record in reader.records().take(CSV_MAX_ROWS) {
        match record {
            Ok(row) => lines.push(row.iter().collect::<Vec<_>>().join("\t")),
            Err(e) => return Extraction::Failed(format!("csv parse failed: {}", e)),
        }
    }
    Extraction::Ok(lines.join("\n"))
}

fn extract_zip_manifest(path: &Path) -> Extraction {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => return Extraction::Failed(format!("open failed: {}", e)),
    };
    let archive = match zip::ZipArchive::new(file) {
        Ok(a) => a,
        Err(e) => return Extraction::Failed(format!("zip open failed: {}", e)),
    };
    let names: Vec<String> = archive
        .file_names()
        .take(ZIP_MAX_ENTRIES)
        .map(|s| s.to_string())
        .collect();
    Extraction::Ok(format!("ZIP archive containing: {}", names.join(", ")))
}

type ZipFile = zip::ZipArchive<std::fs::File>;

fn open_zip(path: &Path) -> Result<ZipFile, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("open failed: {}", e))?;
    zip::ZipArchive::new(file).map_err(|e| format!("zip open failed: {}", e))
}

fn read_zip_entry(archive: &mut ZipFile, name: &str) -> Result<Vec<u8>, String> {
    let entry = archive.by_name(name).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    entry
        .take(MAX_ZIP_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= MAX_ZIP_ENTRY_BYTES {
        return Err(format!("entry {} exceeds size limit", name));
    }
    Ok(out)
}

/// Collect the text of every `<t>` element. Both Word (`w:t`) and
/// PowerPoint (`a:t`) store run text this way.
fn collect_t_text(xml: &[u8], out: &mut String) -> Result<(), String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                in_t = e.local_name().as_ref() == b"t";
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(_)) => in_t = false,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn extract_docx(path: &Path) -> Extraction {
    let result = (|| -> Result<String, String> {
        let mut archive = open_zip(path)?;
        let xml = read_zip_entry(&mut archive, "word/document.xml")?;
        let mut out = String::new();
        collect_t_text(&xml, &mut out)?;
        Ok(out)
    })();
    match result {
        Ok(text) => Extraction::Ok(text),
        Err(e) => Extraction::Failed(format!("docx extraction failed: {}", e)),
    }
}

fn extract_pptx(path: &Path) -> Extraction {
    let result = (|| -> Result<String, String> {
        let mut archive = open_zip(path)?;
        let mut slides: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        slides.sort_by_key(|name| {
            name.trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        });
        let mut out = String::new();
        for name in slides.into_iter().take(PPTX_MAX_SLIDES) {
            let xml = read_zip_entry(&mut archive, &name)?;
            collect_t_text(&xml, &mut out)?;
        }
        Ok(out)
    })();
    match result {
        Ok(text) => Extraction::Ok(text),
        Err(e) => Extraction::Failed(format!("pptx extraction failed: {}", e)),
    }
}

fn extract_xlsx(path: &Path) -> Extraction {
    let result = (|| -> Result<String, String> {
        let mut archive = open_zip(path)?;
        let shared = read_zip_entry(&mut archive, "xl/sharedStrings.xml")
            .map(|xml| parse_shared_strings(&xml))
            .unwrap_or_else(|_| Ok(Vec::new()))?;
        let mut sheets: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
            .map(|s| s.to_string())
            .collect();
        sheets.sort();
        let mut cells = Vec::new();
        for name in sheets.into_iter().take(XLSX_MAX_SHEETS) {
            let xml = read_zip_entry(&mut archive, &name)?;
            parse_sheet_cells(&xml, &shared, &mut cells)?;
        }
        Ok(cells.join("\t"))
    })();
    match result {
        Ok(text) => Extraction::Ok(text),
        Err(e) => Extraction::Failed(format!("xlsx extraction failed: {}", e)),
    }
}

fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                in_t = e.local_name().as_ref() == b"t";
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                strings.push(te.unescape().unwrap_or_default().into_owned());
            }
            Ok(quick_xml::events::Event::End(_)) => in_t = false,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn parse_sheet_cells(
    xml: &[u8],
    shared: &[String],
    cells: &mut Vec<String>,
) -> Result<(), String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared_ref = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    shared_ref = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if shared_ref {
                    if let Ok(i) = value.parse::<usize>() {
                        if let Some(s) = shared.get(i) {
                            cells.push(s.clone());
                        }
                    }
                } else if !value.is_empty() {
                    cells.push(value.to_string());
                }
                in_value = false;
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_value = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((i, _)) => text[..i].to_string(),
        None => text.to_string(),
    }
}
