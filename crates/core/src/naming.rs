//! Output and staging filename rules.
//!
//! Every name the service writes to disk goes through
//! [`sanitize_filename`], so user-supplied output names can never
//! escape the target directory or carry shell metacharacters.

use chrono::{DateTime, Utc};

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`.
///
/// ```
/// use imagegen_core::naming::sanitize_filename;
///
/// assert_eq!(sanitize_filename("room 1/door.png"), "room_1_door.png");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sanitize `base` and prepend a millisecond timestamp.
///
/// Convention: `{unix_millis}_{sanitized}`. Used for images staged into
/// the backend's input directory, where two requests with the same base
/// name must not overwrite each other.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use imagegen_core::naming::timestamped_filename;
///
/// let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
/// assert_eq!(timestamped_filename("mask.png", at), "1700000000123_mask.png");
/// ```
pub fn timestamped_filename(base: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", at.timestamp_millis(), sanitize_filename(base))
}

/// Build an output filename `{stem}_{unix_millis}.{extension}`.
///
/// A trailing `.{extension}` already present on `stem` is dropped so
/// that `door.png` does not become `door.png_123.png`.
pub fn output_filename(stem: &str, extension: &str, at: DateTime<Utc>) -> String {
    let suffix = format!(".{extension}");
    let stem = stem.strip_suffix(suffix.as_str()).unwrap_or(stem);
    format!(
        "{}_{}.{}",
        sanitize_filename(stem),
        at.timestamp_millis(),
        extension
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn allowed_characters_are_kept() {
        assert_eq!(sanitize_filename("Room_01-final.v2"), "Room_01-final.v2");
    }

    #[test]
    fn disallowed_characters_become_underscores() {
        assert_eq!(sanitize_filename("a b/c\\d:e*f"), "a_b_c_d_e_f");
    }

    #[test]
    fn non_ascii_is_replaced_per_character() {
        assert_eq!(sanitize_filename("部屋.png"), "__.png");
    }

    #[test]
    fn path_traversal_is_neutralised() {
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
    }

    #[test]
    fn timestamp_is_prepended() {
        assert_eq!(
            timestamped_filename("reference.png", at(1_000)),
            "1000_reference.png"
        );
    }

    #[test]
    fn same_base_at_different_times_does_not_collide() {
        let first = timestamped_filename("door 1.png", at(1_700_000_000_000));
        let second = timestamped_filename("door 1.png", at(1_700_000_000_001));
        assert_ne!(first, second);
        assert!(first.ends_with("_door_1.png"));
        assert!(second.ends_with("_door_1.png"));
    }

    #[test]
    fn output_filename_appends_timestamp_and_extension() {
        assert_eq!(
            output_filename("webui_generated", "png", at(42)),
            "webui_generated_42.png"
        );
    }

    #[test]
    fn output_filename_drops_duplicate_extension() {
        assert_eq!(output_filename("key card.png", "png", at(7)), "key_card_7.png");
    }
}
