//! Shadow-object naming and upload-id derivation for multipart uploads.
//!
//! A multipart upload has no storage of its own: it lives as an ordinary
//! object under a shadow name, `"__" + object_name + upload_id`, whose
//! parts accumulate in the backend until `CompleteMultiUpload` assembles
//! them into the real object and deletes the shadow. These helpers are
//! shared by the multipart handlers and the in-memory backend so both
//! sides agree on the exact shadow-name format.

use std::time::{SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};

const SHADOW_PREFIX: &str = "__";
const UPLOAD_ID_LEN: usize = 32;

/// Derive a fresh `upload_id` for `object_name`: `md5(object_name || unix_seconds)`,
/// hex-encoded (32 characters).
pub fn new_upload_id(object_name: &str) -> String {
    let unix_seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut hasher = Md5::new();
    hasher.update(object_name.as_bytes());
    hasher.update(unix_seconds.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the shadow object name for `object_name` under `upload_id`.
pub fn shadow_name(object_name: &str, upload_id: &str) -> String {
    format!("{SHADOW_PREFIX}{object_name}{upload_id}")
}

/// Recover the original object name from a shadow object name, by
/// stripping the `"__"` prefix and the trailing 32-hex-char upload id.
/// Returns `None` if `shadow` is too short to contain both.
pub fn object_name_from_shadow(shadow: &str) -> Option<String> {
    let body = shadow.strip_prefix(SHADOW_PREFIX)?;
    if body.len() < UPLOAD_ID_LEN {
        return None;
    }
    let split_at = body.len() - UPLOAD_ID_LEN;
    Some(body[..split_at].to_string())
}

/// Recover the `upload_id` suffix from a shadow object name.
pub fn upload_id_from_shadow(shadow: &str) -> Option<String> {
    let body = shadow.strip_prefix(SHADOW_PREFIX)?;
    if body.len() < UPLOAD_ID_LEN {
        return None;
    }
    Some(body[body.len() - UPLOAD_ID_LEN..].to_string())
}

/// True if `name` looks like a shadow object name (used by `ListObjects`
/// to hide in-progress multipart uploads from plain object listings).
pub fn is_shadow_name(name: &str) -> bool {
    name.starts_with(SHADOW_PREFIX) && object_name_from_shadow(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_name_round_trips() {
        let upload_id = new_upload_id("report.csv");
        assert_eq!(upload_id.len(), UPLOAD_ID_LEN);
        let shadow = shadow_name("report.csv", &upload_id);
        assert_eq!(object_name_from_shadow(&shadow).as_deref(), Some("report.csv"));
        assert_eq!(upload_id_from_shadow(&shadow).as_deref(), Some(upload_id.as_str()));
    }

    #[test]
    fn object_names_containing_double_underscore_still_round_trip() {
        let upload_id = new_upload_id("__weird__name");
        let shadow = shadow_name("__weird__name", &upload_id);
        assert_eq!(object_name_from_shadow(&shadow).as_deref(), Some("__weird__name"));
    }

    #[test]
    fn malformed_shadow_names_reject() {
        assert_eq!(object_name_from_shadow("not-a-shadow"), None);
        assert_eq!(object_name_from_shadow("__tooshort"), None);
        assert!(!is_shadow_name("plain-object"));
    }

    #[test]
    fn upload_ids_for_same_object_in_same_second_collide_by_design() {
        let a = new_upload_id("x");
        let b = new_upload_id("x");
        assert_eq!(a, b, "upload_id is only unique to the second, per design");
    }
}
