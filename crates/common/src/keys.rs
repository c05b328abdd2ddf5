//! Object-key path helpers.
//!
//! Object keys are hierarchical:
//! `patient/<tenant_id>/source_data/<data_id>/<upload_data_name>/<filename>`
//! (file form) or `.../<upload_data_name>/` (directory form).

/// Extract the upload-data name: the segment between the last two slashes
/// of the non-trailing-slash portion of the key.
///
/// Works for both the file form (`.../scan/a.bin` -> `scan`) and the
/// directory form (`.../scan/` -> `scan`). Returns an empty string when the
/// key has fewer than two segments.
pub fn extract_upload_data_name(object_key: &str) -> String {
    let Some(last_slash) = object_key.rfind('/') else {
        return String::new();
    };
    let without_last: &str = &object_key[..last_slash];
    match without_last.rfind('/') {
        Some(second_last) => without_last[second_last + 1..].to_string(),
        None => String::new(),
    }
}

/// Extract the file name: everything after the last slash.
///
/// Returns an empty string for directory-form keys (trailing slash) or
/// keys without a slash.
pub fn extract_file_name(object_key: &str) -> String {
    match object_key.rfind('/') {
        Some(last_slash) if last_slash < object_key.len() - 1 => {
            object_key[last_slash + 1..].to_string()
        }
        _ => String::new(),
    }
}

/// Strip the last path segment, keeping the trailing slash.
///
/// `.../scan/a.bin` -> `.../scan/`. A key already in directory form is
/// returned unchanged, as is a key without any slash.
pub fn parent_directory_key(object_key: &str) -> String {
    match object_key.rfind('/') {
        Some(last_slash) => object_key[..=last_slash].to_string(),
        None => object_key.to_string(),
    }
}
