//! Per-extension-family extraction strategies (spec §4.2).
//!
//! Each strategy returns at most [`crate::model::MAX_EXCERPT_BYTES`] of
//! text. Every strategy is infallible from the caller's point of view: any
//! internal failure is turned into an empty excerpt, matching the
//! Extractor's "never raise for an individual file" contract.

use std::path::Path;

use regex::Regex;

use crate::model::{MAX_EXCERPT_BYTES, TRUNCATION_SENTINEL};

/// Truncates `text` to the excerpt budget, appending the sentinel when
/// truncation actually occurred.
pub fn truncate(text: &str) -> String {
    if text.len() <= MAX_EXCERPT_BYTES {
        return text.to_string();
    }
    // Truncate on a char boundary at or before the budget, then make room
    // for the sentinel.
    let mut end = MAX_EXCERPT_BYTES.saturating_sub(TRUNCATION_SENTINEL.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_SENTINEL)
}

pub fn plain_text(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => truncate(&String::from_utf8_lossy(&bytes)),
        Err(_) => String::new(),
    }
}

pub fn pdf(path: &Path) -> String {
    match pdf_extract::extract_text(path) {
        Ok(text) => {
            // pdf-extract returns the whole document; keep roughly the
            // first few pages worth by character budget rather than
            // re-parsing page boundaries.
            truncate(&text)
        }
        Err(_) => String::new(),
    }
}

pub fn docx(path: &Path) -> String {
    let Ok(bytes) = std::fs::read(path) else {
        return String::new();
    };
    match docx_rs::read_docx(&bytes) {
        Ok(docx) => {
            let mut buf = String::new();
            for child in &docx.document.children {
                collect_paragraph_text(child, &mut buf);
                buf.push('\n');
            }
            truncate(&buf)
        }
        Err(_) => String::new(),
    }
}

fn collect_paragraph_text(child: &docx_rs::DocumentChild, buf: &mut String) {
    if let docx_rs::DocumentChild::Paragraph(p) = child {
        for run in &p.children {
            if let docx_rs::ParagraphChild::Run(r) = run {
                for rc in &r.children {
                    if let docx_rs::RunChild::Text(t) = rc {
                        buf.push_str(&t.text);
                        buf.push(' ');
                    }
                }
            }
        }
    }
}

/// PPTX is a zip of slide XML; each `ppt/slides/slideN.xml` part holds its
/// text runs as DrawingML `<a:t>` elements, title and body alike. Pulled
/// out with a regex rather than a full XML parser, in slide order.
pub fn pptx(path: &Path) -> String {
    let Ok(file) = std::fs::File::open(path) else {
        return String::new();
    };
    let Ok(mut zip) = zip::ZipArchive::new(file) else {
        return String::new();
    };

    let mut slide_names: Vec<String> = (0..zip.len())
        .filter_map(|i| zip.by_index(i).ok().map(|entry| entry.name().to_string()))
        .filter(|name| {
            name.starts_with("ppt/slides/slide") && name.ends_with(".xml") && !name.contains("_rels")
        })
        .collect();
    slide_names.sort_by_key(|name| slide_number(name).unwrap_or(usize::MAX));

    let Ok(text_run) = Regex::new(r"(?s)<a:t>(.*?)</a:t>") else {
        return String::new();
    };

    let mut buf = String::new();
    for name in slide_names {
        let Ok(mut entry) = zip.by_name(&name) else {
            continue;
        };
        let mut xml = String::new();
        if std::io::Read::read_to_string(&mut entry, &mut xml).is_err() {
            continue;
        }
        for run in text_run.captures_iter(&xml) {
            buf.push_str(&unescape_xml_entities(&run[1]));
            buf.push(' ');
        }
        buf.push('\n');
    }

    truncate(&buf)
}

fn slide_number(name: &str) -> Option<usize> {
    name.strip_prefix("ppt/slides/slide")?.strip_suffix(".xml")?.parse().ok()
}

fn unescape_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn xlsx(path: &Path) -> String {
    use calamine::{open_workbook_auto, Reader};

    let Ok(mut workbook) = open_workbook_auto(path) else {
        return String::new();
    };
    let mut buf = String::new();
    for sheet_name in workbook.sheet_names().to_owned() {
        buf.push_str(&sheet_name);
        buf.push('\n');
        if let Ok(range) = workbook.worksheet_range(&sheet_name) {
            for row in range.rows().take(20) {
                let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                buf.push_str(&cells.join("\t"));
                buf.push('\n');
            }
        }
    }
    truncate(&buf)
}

pub fn image_exif(path: &Path) -> String {
    let Ok(file) = std::fs::File::open(path) else {
        return String::new();
    };
    let mut reader = std::io::BufReader::new(file);
    let exif_reader = exif::Reader::new();
    let Ok(exif) = exif_reader.read_from_container(&mut reader) else {
        return String::new();
    };
    let mut buf = String::new();
    for field in exif.fields() {
        buf.push_str(&format!(
            "{}: {}\n",
            field.tag,
            field.display_value().with_unit(&exif)
        ));
    }
    truncate(&buf)
}

/// ffprobe is an out-of-scope external collaborator (spec §1); this
/// adapter shells out to it when present and degrades to an empty excerpt
/// otherwise, exactly as any other extractor failure does.
fn ffprobe_summary(path: &Path) -> String {
    let output = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output();

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
        _ => String::new(),
    }
}

pub fn audio(path: &Path) -> String {
    truncate(&ffprobe_summary(path))
}

pub fn video(path: &Path) -> String {
    truncate(&ffprobe_summary(path))
}

pub fn ebook(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    format!("ebook:{ext}")
}

pub fn archive(path: &Path) -> String {
    let Ok(file) = std::fs::File::open(path) else {
        return String::new();
    };
    let Ok(mut zip) = zip::ZipArchive::new(file) else {
        return String::new();
    };
    let mut buf = String::new();
    for i in 0..zip.len() {
        if let Ok(entry) = zip.by_index(i) {
            buf.push_str(entry.name());
            buf.push('\n');
        }
    }
    truncate(&buf)
}
