//! Binary-file detection for the indexer.
//!
//! Known text extensions short-circuit to text. Everything else is judged
//! from a byte sample: a UTF-8 BOM or a tiny sample means text; otherwise
//! the counts of null, control, and extended-ASCII control bytes are compared
//! against [`BinaryThresholds`]. When the first bytes look like source or
//! markup only the (looser) null-byte threshold applies.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

/// Extensions that are always treated as text.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "json", "xml", "html", "css", "js", "py", "go", "c", "cpp", "h", "java", "sh",
    "bat", "ps1", "yaml", "yml", "toml", "ini", "cfg", "config", "properties", "env", "example",
    "log", "gitignore", "csv", "tsv",
];

/// Prefixes that suggest the sample is source code or markup.
const TEXT_MARKERS: &[&str] = &[
    "<!doctype", "<html", "<?xml", "{", "[", "//", "/*", "#!", "import ", "package ", "using ",
    "function ", "class ", "def ", "var ", "const ", "let ", "from ", "# ", "// ", "/* ", "; ",
    "' ",
];

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Tunable limits for [`is_binary`].
///
/// Each `*_divisor` is a ratio expressed as `1/divisor` of the sample size:
/// a file is binary when a byte class count exceeds `sample_len / divisor`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BinaryThresholds {
    #[serde(default = "default_sample_bytes")]
    pub sample_bytes: usize,
    #[serde(default = "default_min_sample_bytes")]
    pub min_sample_bytes: usize,
    #[serde(default = "default_marker_window")]
    pub marker_window: usize,
    #[serde(default = "default_marked_null_divisor")]
    pub marked_null_divisor: usize,
    #[serde(default = "default_null_divisor")]
    pub null_divisor: usize,
    #[serde(default = "default_control_divisor")]
    pub control_divisor: usize,
    #[serde(default = "default_extended_divisor")]
    pub extended_divisor: usize,
}

fn default_sample_bytes() -> usize {
    1000
}
fn default_min_sample_bytes() -> usize {
    32
}
fn default_marker_window() -> usize {
    100
}
fn default_marked_null_divisor() -> usize {
    50
}
fn default_null_divisor() -> usize {
    1000
}
fn default_control_divisor() -> usize {
    100
}
fn default_extended_divisor() -> usize {
    50
}

impl Default for BinaryThresholds {
    fn default() -> Self {
        Self {
            sample_bytes: default_sample_bytes(),
            min_sample_bytes: default_min_sample_bytes(),
            marker_window: default_marker_window(),
            marked_null_divisor: default_marked_null_divisor(),
            null_divisor: default_null_divisor(),
            control_divisor: default_control_divisor(),
            extended_divisor: default_extended_divisor(),
        }
    }
}

/// Whether `path` has one of the [`TEXT_EXTENSIONS`]. Dotfiles such as
/// `.gitignore` and `.env` match on their whole name.
pub fn has_text_extension(path: &Path) -> bool {
    let ext = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => match path.file_name() {
            Some(name) => name.to_string_lossy().trim_start_matches('.').to_lowercase(),
            None => return false,
        },
    };
    TEXT_EXTENSIONS.contains(&ext.as_str())
}

/// Classify a file on disk. Known text extensions are never opened.
pub fn is_binary_file(path: &Path, thresholds: &BinaryThresholds) -> std::io::Result<bool> {
    if has_text_extension(path) {
        return Ok(false);
    }
    let file = std::fs::File::open(path)?;
    let mut sample = Vec::with_capacity(thresholds.sample_bytes);
    file.take(thresholds.sample_bytes as u64)
        .read_to_end(&mut sample)?;
    Ok(is_binary(&sample, thresholds))
}

/// Classify a byte sample. Only the first `sample_bytes` are inspected.
pub fn is_binary(bytes: &[u8], thresholds: &BinaryThresholds) -> bool {
    let sample = &bytes[..bytes.len().min(thresholds.sample_bytes)];

    if sample.starts_with(&UTF8_BOM) {
        return false;
    }
    if sample.len() < thresholds.min_sample_bytes {
        return false;
    }

    let mut nulls = 0usize;
    let mut controls = 0usize;
    let mut extended = 0usize;
    for &b in sample {
        match b {
            0 => nulls += 1,
            // tab, LF, VT, FF, CR and ESC are common in text
            1..=8 | 14..=26 | 28..=31 => controls += 1,
            128..=159 => extended += 1,
            _ => {}
        }
    }

    let n = sample.len();
    if has_text_marker(sample, thresholds.marker_window) {
        return nulls > n / thresholds.marked_null_divisor.max(1);
    }

    nulls > n / thresholds.null_divisor.max(1)
        || controls > n / thresholds.control_divisor.max(1)
        || extended > n / thresholds.extended_divisor.max(1)
}

fn has_text_marker(sample: &[u8], window: usize) -> bool {
    let head = &sample[..sample.len().min(window)];
    let head = String::from_utf8_lossy(head).to_lowercase();
    TEXT_MARKERS.iter().any(|marker| head.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_bytes_are_binary() {
        let data = vec![0u8; 64];
        assert!(is_binary(&data, &BinaryThresholds::default()));
    }

    #[test]
    fn go_source_is_text() {
        let data = b"package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"hi\")\n}\n";
        assert!(!is_binary(data, &BinaryThresholds::default()));
    }

    #[test]
    fn short_samples_are_text() {
        assert!(!is_binary(&[0, 1, 2, 3], &BinaryThresholds::default()));
    }

    #[test]
    fn bom_is_text() {
        let mut data = UTF8_BOM.to_vec();
        data.extend(std::iter::repeat(0u8).take(100));
        assert!(!is_binary(&data, &BinaryThresholds::default()));
    }

    #[test]
    fn control_bytes_without_markers_are_binary() {
        let mut data = b"plain words here ".repeat(4);
        data.extend_from_slice(&[1, 2, 3]);
        assert!(is_binary(&data, &BinaryThresholds::default()));
    }

    #[test]
    fn marker_relaxes_control_threshold() {
        let mut data = b"#!/bin/sh\necho hello world and more text ".repeat(2);
        data.extend_from_slice(&[1, 2, 3]);
        assert!(!is_binary(&data, &BinaryThresholds::default()));
    }

    #[test]
    fn thresholds_are_configurable() {
        let mut data = b"plain words here ".repeat(4);
        data.push(1);
        let strict = BinaryThresholds::default();
        assert!(is_binary(&data, &strict));
        let lenient = BinaryThresholds {
            control_divisor: 10,
            ..BinaryThresholds::default()
        };
        assert!(!is_binary(&data, &lenient));
    }

    #[test]
    fn text_extension_lookup() {
        assert!(has_text_extension(Path::new("main.go")));
        assert!(has_text_extension(Path::new("README.MD")));
        assert!(has_text_extension(Path::new(".gitignore")));
        assert!(!has_text_extension(Path::new("image.png")));
        assert!(!has_text_extension(Path::new("Makefile")));
    }

    #[test]
    fn file_check_samples_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let thresholds = BinaryThresholds::default();

        let blob = tmp.path().join("blob.bin");
        let mut data = vec![0u8; 64];
        data.extend(b"trailing text that is never sampled ".repeat(100));
        std::fs::write(&blob, &data).unwrap();
        assert!(is_binary_file(&blob, &thresholds).unwrap());

        // Text extensions skip the sample, so a missing file is still text.
        assert!(!is_binary_file(&tmp.path().join("absent.md"), &thresholds).unwrap());
        assert!(is_binary_file(&tmp.path().join("absent.bin"), &thresholds).is_err());
    }
}
