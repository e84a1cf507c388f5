//! Filename generation and manipulation.

use crate::error::{Error, Result};
use crate::media::DrmType;

/// Validate and sanitize a filename by removing or replacing invalid characters.
///
/// Returns an error if the filename contains path traversal patterns.
pub fn sanitize_filename(name: &str) -> Result<String> {
    // Reject path traversal attempts
    if name.contains("..") {
        return Err(Error::InvalidFilename(format!(
            "Path traversal detected: '{}'",
            name
        )));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidFilename(format!(
            "Path separators not allowed in filename: '{}'",
            name
        )));
    }

    if name.contains('\0') {
        return Err(Error::InvalidFilename(format!(
            "Null bytes not allowed in filename: '{}'",
            name
        )));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.trim().is_empty() {
        return Err(Error::InvalidFilename(
            "Filename cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

/// Sanitize a path component (folder or title) with less strict validation.
///
/// Separators are replaced rather than rejected, so titles such as
/// "AC/DC" stay usable as folder names.
pub fn sanitize_path_component(name: &str) -> Result<String> {
    if name.contains("..") {
        return Err(Error::InvalidFilename(format!(
            "Path traversal detected: '{}'",
            name
        )));
    }

    if name.contains('\0') {
        return Err(Error::InvalidFilename(format!(
            "Null bytes not allowed: '{}'",
            name
        )));
    }

    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.trim().is_empty() {
        return Err(Error::InvalidFilename(
            "Path component cannot be empty or whitespace-only".to_string(),
        ));
    }

    Ok(sanitized)
}

/// File extension for audio delivered under a DRM scheme.
pub fn audio_extension(drm: DrmType) -> &'static str {
    match drm {
        DrmType::Mpeg => "mp3",
        DrmType::Aax => "aax",
        DrmType::Adrm => "aaxc",
    }
}

/// Audio filename: `<base>-<codec>.<ext>`.
pub fn audio_filename(base: &str, codec: &str, drm: DrmType) -> Result<String> {
    sanitize_filename(&format!("{}-{}.{}", base, codec, audio_extension(drm)))
}

/// Voucher filename: `<base>-<codec>.voucher`.
pub fn voucher_filename(base: &str, codec: &str) -> Result<String> {
    sanitize_filename(&format!("{}-{}.voucher", base, codec))
}

/// Cover filename: `<base>_(<size>).jpg`.
pub fn cover_filename(base: &str, size: u32) -> Result<String> {
    sanitize_filename(&format!("{}_({}).jpg", base, size))
}

pub fn pdf_filename(base: &str) -> Result<String> {
    sanitize_filename(&format!("{}.pdf", base))
}

pub fn chapters_filename(base: &str, codec: &str) -> Result<String> {
    sanitize_filename(&format!("{}-{}-chapters.json", base, codec))
}

pub fn annotations_filename(base: &str) -> Result<String> {
    sanitize_filename(&format!("{}-annotations.json", base))
}
