//! Upload validation
//!
//! Runs before anything in the session changes: a rejected file leaves the
//! current document and its annotations untouched.

use crate::config::AnnotatorConfig;
use crate::error::UploadError;

/// Check the declared type and size of a picked file
pub fn validate_upload(mime: &str, size: usize, config: &AnnotatorConfig) -> Result<(), UploadError> {
    // Browsers may append parameters, e.g. "application/pdf; charset=binary"
    let essence = mime.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case(&config.accepted_mime) {
        return Err(UploadError::WrongType(mime.to_string()));
    }
    if size == 0 {
        return Err(UploadError::Empty);
    }
    if size > config.max_upload_bytes {
        return Err(UploadError::TooLarge {
            size,
            limit: config.max_upload_bytes,
        });
    }
    Ok(())
}
