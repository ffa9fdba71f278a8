// file: src/validation/format.rs
// description: minimal structural checks for FASTA, TSV, CSV, JSON and HTML artifacts
// reference: https://docs.rs/regex

use crate::models::ArtifactType;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

lazy_static! {
    static ref HTML_OPEN: Regex = Regex::new(r"(?i)<html(\s[^>]*)?>").unwrap();
    static ref HTML_CLOSE: Regex = Regex::new(r"(?i)</html\s*>").unwrap();
}

/// Reports are small; anything past this is not scanned for the closing tag.
const HTML_SCAN_LIMIT: u64 = 64 * 1_048_576;

/// Checks the shape of an existing, non-empty file. `Ok(())` means the file looks
/// like its declared type; `Err` carries a human-readable reason.
pub fn check_format(path: &Path, artifact_type: ArtifactType) -> Result<(), String> {
    match artifact_type {
        ArtifactType::Fasta | ArtifactType::ProteinFasta => check_fasta(path),
        ArtifactType::Tsv | ArtifactType::Csv => check_header(path),
        ArtifactType::Json => check_json(path),
        ArtifactType::Html => check_html(path),
    }
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("cannot open {}: {}", path.display(), e))
}

/// Reads lines until one has content. Genome files can be large, so only the
/// prefix that matters is read.
fn first_non_blank_line(path: &Path) -> Result<Option<String>, String> {
    let reader = open(path)?;
    for line in reader.lines() {
        let line = line.map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        let trimmed = line.trim_start_matches('\u{feff}').trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
    Ok(None)
}

fn check_fasta(path: &Path) -> Result<(), String> {
    match first_non_blank_line(path)? {
        Some(line) if line.starts_with('>') => Ok(()),
        Some(line) => Err(format!(
            "FASTA must start with a '>' header line, found {:?}",
            preview(&line)
        )),
        None => Err("FASTA contains only blank lines".to_string()),
    }
}

fn check_header(path: &Path) -> Result<(), String> {
    let mut reader = open(path)?;
    let mut header = String::new();
    reader
        .read_line(&mut header)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;

    if header.trim_start_matches('\u{feff}').trim().is_empty() {
        Err("table has an empty header line".to_string())
    } else {
        Ok(())
    }
}

fn check_json(path: &Path) -> Result<(), String> {
    let reader = open(path)?;
    serde_json::from_reader::<_, serde_json::Value>(reader)
        .map(|_| ())
        .map_err(|e| format!("invalid JSON: {}", e))
}

fn check_html(path: &Path) -> Result<(), String> {
    let mut content = String::new();
    open(path)?
        .take(HTML_SCAN_LIMIT)
        .read_to_string(&mut content)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;

    let open_tag = HTML_OPEN.find(&content);
    let close_tag = HTML_CLOSE.find(&content);
    match (open_tag, close_tag) {
        (Some(open), Some(close)) if open.end() <= close.start() => Ok(()),
        (None, _) => Err("HTML document has no opening <html> tag".to_string()),
        _ => Err("HTML document has no closing </html> tag".to_string()),
    }
}

fn preview(line: &str) -> String {
    const LIMIT: usize = 40;
    match line.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_fasta_allows_leading_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.fasta", "\n\n>seq1\nACGT\n");
        assert!(check_format(&path, ArtifactType::Fasta).is_ok());
    }

    #[test]
    fn test_fasta_without_header_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.fasta", "ACGTACGT\n>seq1\n");
        let err = check_format(&path, ArtifactType::Fasta).unwrap_err();
        assert!(err.contains("'>'"));

        let path = write(&dir, "b.faa", "   \n\n");
        assert!(check_format(&path, ArtifactType::ProteinFasta).is_err());
    }

    #[test]
    fn test_table_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.tsv", "gene\tclass\nblaTEM\tBETA-LACTAM\n");
        assert!(check_format(&path, ArtifactType::Tsv).is_ok());

        let path = write(&dir, "b.csv", "\naccession,organism\n");
        assert!(check_format(&path, ArtifactType::Csv).is_err());
    }

    #[test]
    fn test_json_must_parse() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a.json", r#"{"ok": true}"#);
        assert!(check_format(&path, ArtifactType::Json).is_ok());

        let path = write(&dir, "b.json", r#"{"ok": tru"#);
        assert!(check_format(&path, ArtifactType::Json).is_err());
    }

    #[test]
    fn test_html_needs_root_tags() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.html",
            "<!DOCTYPE html>\n<HTML lang=\"en\"><body>ok</body></HTML>\n",
        );
        assert!(check_format(&path, ArtifactType::Html).is_ok());

        let path = write(&dir, "b.html", "<html><body>truncated");
        let err = check_format(&path, ArtifactType::Html).unwrap_err();
        assert!(err.contains("closing"));

        let path = write(&dir, "c.html", "<body>no root</body>");
        let err = check_format(&path, ArtifactType::Html).unwrap_err();
        assert!(err.contains("opening"));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(50);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), 43);
    }
}
