//! URL 处理工具
//!
//! 引用清理、针对资源表的多策略解析、数据 URL 构造。

use base64::{prelude::BASE64_STANDARD, Engine};
use percent_encoding::{AsciiSet, CONTROLS};
pub use url::Url;

use crate::parsers::mhtml::ResourceMap;

/// Percent-encoding set equivalent to JavaScript's `encodeURIComponent`:
/// everything except alphanumerics and `- _ . ! ~ * ' ( )`.
pub const COMPONENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'#').add(b'$').add(b'%').add(b'&')
    .add(b'+').add(b',').add(b'/').add(b':').add(b';').add(b'<')
    .add(b'=').add(b'>').add(b'?').add(b'@').add(b'[').add(b'\\')
    .add(b']').add(b'^').add(b'`').add(b'{').add(b'|').add(b'}');

/// Strip surrounding single or double quotes from a reference extracted out
/// of HTML or CSS.
pub fn clean_reference(reference: &str) -> &str {
    let trimmed = reference.trim();

    if trimmed.len() >= 2 {
        let bytes = trimmed.as_bytes();
        if (bytes[0] == b'"' && bytes[trimmed.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[trimmed.len() - 1] == b'\'')
        {
            return &trimmed[1..trimmed.len() - 1];
        }
    }

    trimmed
}

pub fn is_url_and_has_protocol(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => !url.scheme().is_empty(),
        Err(_) => false,
    }
}

/// Path-only join of a reference against a base URL string.
///
/// The last segment of `base` is popped, then `.` and `..` segments of the
/// reference are folded against the remaining stack. No scheme or authority
/// handling beyond what `base` already carries; captures that walk `..`
/// past the authority produce keys that simply fail to match.
pub fn join_relative(base: &str, reference: &str) -> String {
    let mut stack: Vec<&str> = base.split('/').collect();
    stack.pop();

    for part in reference.split('/') {
        match part {
            "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }

    stack.join("/")
}

/// Resolve a reference against the media table, returning the matching
/// media key (which doubles as the base URL for nested stylesheets).
///
/// Strategies, in order:
/// 1. the cleaned reference verbatim
/// 2. path-only relative join against `base`
/// 3. root-relative against the origin of `base`
/// 4. filename tail (> 3 chars) against key suffixes, in archive order
pub fn resolve_reference(media: &ResourceMap, base: &str, reference: &str) -> Option<String> {
    let reference = clean_reference(reference);
    if reference.is_empty() {
        return None;
    }

    if media.contains_key(reference) {
        return Some(reference.to_string());
    }

    if !is_url_and_has_protocol(reference) {
        let joined = join_relative(base, reference);
        if media.contains_key(&joined) {
            return Some(joined);
        }
    }

    if reference.starts_with('/') {
        if let Ok(base_url) = Url::parse(base) {
            if let Ok(rooted) = base_url.join(reference) {
                let rooted = rooted.to_string();
                if media.contains_key(&rooted) {
                    return Some(rooted);
                }
            }
        }
    }

    // MHTML captures frequently disagree about path normalization; matching
    // on the filename tail recovers assets that moved between directories.
    let filename = reference.rsplit('/').next().unwrap_or_default();
    if filename.len() > 3 {
        let suffix = format!("/{filename}");
        for (key, _) in media.iter() {
            if key.ends_with(&suffix) || key == filename {
                return Some(key.clone());
            }
        }
    }

    None
}

/// Build a base64 data URL for the given payload.
pub fn create_data_url(media_type: &str, charset: &str, data: &[u8]) -> Url {
    let mut data_url: Url = Url::parse("data:,").unwrap();
    let c: String = if !charset.trim().is_empty() && !charset.trim().eq_ignore_ascii_case("utf-8") {
        format!(";charset={}", charset.trim())
    } else {
        String::new()
    };

    data_url.set_path(format!("{}{};base64,{}", media_type, c, BASE64_STANDARD.encode(data)).as_str());

    data_url
}
