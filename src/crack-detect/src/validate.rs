//! Upload validation.
//!
//! Pure pass/fail checks on the declared filename and payload size. The
//! pipeline runs them again even when the transport already enforced the same
//! limits.

use crate::error::ValidationError;

/// 5 MB upload cap.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Check the declared filename: present, non-empty and carrying a supported
/// image extension (case-insensitive).
pub fn validate_filename(filename: Option<&str>) -> Result<(), ValidationError> {
    let name = match filename {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ValidationError::NoFile),
    };

    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ValidationError::UnsupportedFormat),
    }
}

/// Check the payload size against [`MAX_UPLOAD_BYTES`].
pub fn validate_size(len: usize) -> Result<(), ValidationError> {
    if len > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge);
    }

    Ok(())
}

/// Full upload verdict: filename first, then size.
pub fn validate_upload(filename: Option<&str>, len: usize) -> Result<(), ValidationError> {
    validate_filename(filename)?;
    validate_size(len)
}
