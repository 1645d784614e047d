//! Utility functions for file naming and hashing

use crate::types::ImageKind;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Width of the zero-padded sequence number in saved file names
pub const SEQUENCE_WIDTH: usize = 4;

/// Turn a species name into a directory/file stem
///
/// Lowercases, maps whitespace, `/` and `-` to `_`, drops any other
/// non-alphanumeric character and collapses runs of `_`. Falls back to
/// `species_<id>` when nothing usable remains.
///
/// # Examples
///
/// ```
/// use species_dl::utils::sanitize_species_name;
///
/// assert_eq!(sanitize_species_name("Ikan Kakap Merah", 1), "ikan_kakap_merah");
/// assert_eq!(sanitize_species_name("Kerapu/Sunu - Macan", 2), "kerapu_sunu_macan");
/// assert_eq!(sanitize_species_name("???", 7), "species_7");
/// ```
pub fn sanitize_species_name(name: &str, id: u32) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_us = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_us = false;
        } else if (ch.is_whitespace() || ch == '/' || ch == '-' || ch == '_') && !last_us {
            out.push('_');
            last_us = true;
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() {
        format!("species_{}", id)
    } else {
        out
    }
}

/// File name for the `sequence`-th image of a species
pub fn image_file_name(stem: &str, sequence: u32, kind: ImageKind) -> String {
    format!(
        "{}_{:0width$}.{}",
        stem,
        sequence,
        kind.extension(),
        width = SEQUENCE_WIDTH
    )
}

/// Parse the sequence number out of a file name produced by [`image_file_name`]
///
/// Returns `None` for files that do not follow `<stem>_<digits>.<image ext>`.
pub fn parse_sequence_number(file_name: &str, stem: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix('_')?;
    let (digits, ext) = rest.rsplit_once('.')?;
    ImageKind::from_extension(ext)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Images already saved in a species directory, in sequence order
///
/// A missing directory is treated as empty.
pub fn existing_images(dir: &Path, stem: &str) -> std::io::Result<Vec<(u32, PathBuf)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(name) = name.to_str()
            && let Some(seq) = parse_sequence_number(name, stem)
        {
            found.push((seq, entry.path()));
        }
    }
    found.sort_by_key(|(seq, _)| *seq);
    Ok(found)
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Image kind implied by the last path segment of a URL, if any
pub fn url_image_kind(url: &str) -> Option<ImageKind> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    ImageKind::from_extension(ext)
}

/// Whether the URL's last path segment carries an explicit, non-image extension
pub(crate) fn url_has_foreign_extension(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let Some(last) = parsed.path_segments().and_then(|mut s| s.next_back()) else {
        return false;
    };
    match last.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 => {
            ImageKind::from_extension(ext).is_none()
                && matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "svg" | "ico" | "bmp" | "tif" | "tiff" | "html" | "htm" | "php" | "pdf" | "js"
                        | "css"
                )
        }
        _ => false,
    }
}
