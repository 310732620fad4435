//! File name conventions.
//!
//! ```text
//! report.txt          --encode-->  report_encoded.txt
//! report_encoded.txt  --decode-->  report_decoded.txt
//! notes               --decode-->  notes_decoded
//! ```

use crate::error::{FileError, Result};
use std::path::Path;

/// Suffix added to the stem of an encoded file
pub const ENCODED_SUFFIX: &str = "_encoded";

/// Suffix added to the stem of a reconstructed file
pub const DECODED_SUFFIX: &str = "_decoded";

/// Final path component of a peer-supplied name
///
/// Both separators are honoured so a name from any platform cannot climb
/// out of the receiving directory.
///
/// # Errors
/// `InvalidName` if nothing usable is left
pub fn sanitize(name: &str) -> Result<&str> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return Err(FileError::InvalidName(name.to_string()));
    }
    Ok(base)
}

/// `<stem>_encoded<ext>` for the final component of `path`
///
/// # Errors
/// `InvalidName` if `path` has no file name
pub fn encoded_name(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FileError::InvalidName(path.display().to_string()))?;
    let (stem, ext) = split_extension(file_name);
    Ok(format!("{stem}{ENCODED_SUFFIX}{ext}"))
}

/// Name for the reconstruction of a received container
///
/// A trailing `_encoded` on the stem becomes `_decoded`; otherwise
/// `_decoded` is appended so the container is never overwritten.
#[must_use]
pub fn decoded_name(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    let stem = stem.strip_suffix(ENCODED_SUFFIX).unwrap_or(stem);
    format!("{stem}{DECODED_SUFFIX}{ext}")
}

/// Split at the last dot, keeping the dot with the extension
///
/// A leading dot is part of the stem (`.profile` has no extension).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(i) => name.split_at(i),
    }
}
