//! HEAD response header interpretation.
//!
//! Header values are decoded at use, not at ingest — this module is called
//! once per HEAD response, immediately after the response arrives, and its
//! output is written straight into the Entry. No decoded form is cached
//! anywhere except the four Entry fields that carry it forward (`etag`,
//! `version_id`, `content_type`, `ctime`).

use std::time::SystemTime;

use chrono::{DateTime, TimeZone, Utc};

use crate::entry::Entry;
use crate::ports::HeadResponse;

/// Case-insensitively finds a header value by name.
pub fn find_header<'a>(headers: &'a std::collections::HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parses `x-amz-meta-date`'s RFC-1123 form (`%a, %d %b %Y %H:%M:%S %Z`),
/// falling back to a `%z`-suffixed form if the first parse fails.
fn parse_meta_date(raw: &str) -> Option<SystemTime> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.into());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%a, %d %b %Y %H:%M:%S %Z") {
        return Some(Utc.from_utc_datetime(&naive).into());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%a, %d %b %Y %H:%M:%S %z") {
        return Some(dt.into());
    }
    None
}

/// Applies a HEAD response's headers to an Entry in place: size, directory
/// promotion, mode override, ctime, and xattrs. Bumps `xattr_time`
/// unconditionally — this is the one and only place xattrs are refreshed.
pub fn apply_head_response(entry: &mut Entry, resp: &HeadResponse, now: SystemTime) {
    if let Some(len) = find_header(&resp.headers, "Content-Length") {
        // Clamp negatives to 0; `parse::<u64>` already rejects a leading
        // '-', which has the same effect.
        entry.size = len.parse::<u64>().unwrap_or(0);
    }

    if let Some(ctype) = find_header(&resp.headers, "Content-Type") {
        if ctype == "application/x-directory" {
            entry.promote_to_directory(now);
        }
        entry.xattrs.content_type = Some(ctype.to_string());
    }

    if let Some(mode) = find_header(&resp.headers, "x-amz-meta-mode") {
        if let Ok(mode) = mode.parse::<u32>() {
            let type_bits = entry.mode & 0o170000;
            entry.mode = (mode & 0o7777) | type_bits;
        }
    }

    if let Some(date) = find_header(&resp.headers, "x-amz-meta-date") {
        if let Some(parsed) = parse_meta_date(date) {
            entry.ctime = parsed;
        }
    }

    if let Some(etag) = find_header(&resp.headers, "ETag") {
        entry.xattrs.etag = Some(etag.trim_matches('"').to_string());
    }

    if let Some(version_id) = find_header(&resp.headers, "x-amz-version-id") {
        entry.xattrs.version_id = Some(version_id.to_string());
    }

    entry.xattr_time = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryKind, S_IFREG};
    use crate::inode::Ino;
    use std::collections::HashMap;

    fn file_entry() -> Entry {
        Entry::new(
            Ino::new(2),
            Ino::ROOT,
            "a.txt".into(),
            "a.txt".into(),
            EntryKind::File,
            0o644 | S_IFREG,
            0,
            SystemTime::now(),
            0,
            SystemTime::now(),
        )
    }

    fn headers(pairs: &[(&str, &str)]) -> HeadResponse {
        HeadResponse {
            headers: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn content_length_sets_size() {
        let mut e = file_entry();
        apply_head_response(&mut e, &headers(&[("Content-Length", "42")]), SystemTime::now());
        assert_eq!(e.size, 42);
    }

    #[test]
    fn negative_content_length_clamps_to_zero() {
        let mut e = file_entry();
        e.size = 7;
        apply_head_response(&mut e, &headers(&[("Content-Length", "-1")]), SystemTime::now());
        assert_eq!(e.size, 0);
    }

    #[test]
    fn x_directory_content_type_promotes_to_directory() {
        let mut e = file_entry();
        apply_head_response(
            &mut e,
            &headers(&[("Content-Type", "application/x-directory")]),
            SystemTime::now(),
        );
        assert!(e.is_directory());
    }

    #[test]
    fn meta_mode_overrides_permission_bits_but_keeps_type() {
        let mut e = file_entry();
        apply_head_response(&mut e, &headers(&[("x-amz-meta-mode", "33188")]), SystemTime::now());
        assert_eq!(e.mode & 0o7777, 0o644);
        assert_eq!(e.mode & 0o170000, S_IFREG);
    }

    #[test]
    fn etag_is_stripped_of_quotes() {
        let mut e = file_entry();
        apply_head_response(&mut e, &headers(&[("ETag", "\"abc123\"")]), SystemTime::now());
        assert_eq!(e.xattrs.etag.as_deref(), Some("abc123"));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut map = HashMap::new();
        map.insert("content-length".to_string(), "5".to_string());
        assert_eq!(find_header(&map, "Content-Length"), Some("5"));
    }

    #[test]
    fn meta_date_parses_rfc1123_form() {
        let mut e = file_entry();
        apply_head_response(
            &mut e,
            &headers(&[("x-amz-meta-date", "Wed, 21 Oct 2015 07:28:00 GMT")]),
            SystemTime::now(),
        );
        let epoch: DateTime<Utc> = e.ctime.into();
        assert_eq!(epoch.format("%Y-%m-%d").to_string(), "2015-10-21");
    }
}
