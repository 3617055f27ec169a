//! Extractor: enriches a FileRecord with a bounded text excerpt (spec §4.2).
//!
//! Dispatch is purely by extension family. No strategy is allowed to raise;
//! a failing strategy silently yields an empty excerpt and the caller logs
//! a warning, matching the teacher's `get_content_preview` fallback
//! discipline in `vfs/scanner.rs`.

mod strategies;

use tracing::warn;

use crate::model::FileRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    PlainText,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Image,
    Audio,
    Video,
    Ebook,
    Archive,
    Unknown,
}

fn family_for_extension(ext: &str) -> Family {
    match ext {
        "txt" | "md" | "json" | "xml" | "html" | "htm" | "csv" | "log" => Family::PlainText,
        "pdf" => Family::Pdf,
        "docx" => Family::Docx,
        "pptx" => Family::Pptx,
        "xlsx" => Family::Xlsx,
        "jpg" | "jpeg" | "png" | "tiff" | "tif" | "heic" => Family::Image,
        "mp3" | "wav" | "flac" | "m4a" | "ogg" => Family::Audio,
        "mp4" | "mov" | "mkv" | "avi" | "webm" => Family::Video,
        "epub" | "mobi" | "azw" => Family::Ebook,
        "zip" => Family::Archive,
        _ => Family::Unknown,
    }
}

/// Extracts an excerpt for one FileRecord, returning a new record with the
/// `excerpt` field populated. Never fails; extraction problems are logged
/// and leave the excerpt empty.
pub fn extract(record: FileRecord) -> FileRecord {
    let family = family_for_extension(&record.extension);

    let excerpt = std::panic::catch_unwind(|| run_strategy(family, &record.path))
        .unwrap_or_else(|_| {
            warn!(path = %record.path.display(), "extraction strategy panicked, excerpt left empty");
            String::new()
        });

    let excerpt = if excerpt.is_empty() {
        None
    } else {
        Some(excerpt)
    };

    FileRecord { excerpt, ..record }
}

fn run_strategy(family: Family, path: &std::path::Path) -> String {
    match family {
        Family::PlainText => strategies::plain_text(path),
        Family::Pdf => strategies::pdf(path),
        Family::Docx => strategies::docx(path),
        Family::Pptx => strategies::pptx(path),
        Family::Xlsx => strategies::xlsx(path),
        Family::Image => strategies::image_exif(path),
        Family::Audio => strategies::audio(path),
        Family::Video => strategies::video(path),
        Family::Ebook => strategies::ebook(path),
        Family::Archive => strategies::archive(path),
        Family::Unknown => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(path: std::path::PathBuf, extension: &str) -> FileRecord {
        FileRecord {
            path,
            size_bytes: 100,
            modified_at: Some(Utc::now()),
            created_at: Some(Utc::now()),
            extension: extension.to_string(),
            mime_guess: None,
            sha256: "deadbeef".into(),
            excerpt: None,
        }
    }

    #[test]
    fn unknown_extension_yields_empty_excerpt() {
        let rec = record(std::path::PathBuf::from("/tmp/whatever.xyz"), "xyz");
        let out = extract(rec);
        assert!(out.excerpt.is_none());
    }

    #[test]
    fn plain_text_extension_populates_excerpt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "project notes").unwrap();
        let rec = record(path, "txt");
        let out = extract(rec);
        assert_eq!(out.excerpt.as_deref(), Some("project notes"));
    }

    #[test]
    fn ebook_extension_yields_format_marker() {
        let rec = record(std::path::PathBuf::from("/books/one.epub"), "epub");
        let out = extract(rec);
        assert_eq!(out.excerpt.as_deref(), Some("ebook:epub"));
    }
}
