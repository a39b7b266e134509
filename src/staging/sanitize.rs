//! Filename sanitization

use regex::Regex;
use std::sync::LazyLock;

/// Longest display name handed out, in bytes (output is always ASCII)
pub const MAX_NAME_LEN: usize = 100;

/// Prefix placed on every served file to keep them apart from other content
pub const NAME_PREFIX: &str = "ytdl-";

/// Stand-in for an artist or title that has no usable characters
pub const UNKNOWN_PART: &str = "unknown";

#[allow(clippy::expect_used)]
static DISALLOWED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_ +,-]+").expect("filename regex is valid"));

fn substitute(c: char) -> Option<&'static str> {
    let s = match c {
        '(' | ')' | '¿' | '!' | '^' | '$' | '%' | '@' | '`' | '¡' | '|' => "_",
        '&' | '±' => "+",
        '—' | '~' | '/' | '\\' | '¯' => "-",
        '\'' | '#' => "",
        'ß' => "ss",
        'ñ' => "n",
        'Ñ' => "N",
        'é' | 'è' | 'ê' | 'ë' => "e",
        'É' | 'È' | 'Ê' | 'Ë' => "E",
        'à' | 'â' | 'ä' | 'á' => "a",
        'À' | 'Â' | 'Ä' | 'Á' => "A",
        'ò' | 'ô' | 'ö' | 'ó' => "o",
        'Ò' | 'Ô' | 'Ö' | 'Ó' => "O",
        'ì' | 'î' | 'ï' | 'í' => "i",
        'Ì' | 'Î' | 'Ï' | 'Í' => "I",
        'ù' | 'û' | 'ü' | 'ú' => "u",
        'Ù' | 'Û' | 'Ü' | 'Ú' => "U",
        _ => return None,
    };
    Some(s)
}

/// Reduce `input` to `[0-9A-Za-z_ +,-]`, single spaces, at most [`MAX_NAME_LEN`] bytes
///
/// Punctuation and common accented letters are mapped to ASCII first; whatever is still
/// outside the allowed set is removed. The result is stable under repeated application.
pub fn sanitize_filename(input: &str) -> String {
    let mut substituted = String::with_capacity(input.len());
    for c in input.chars() {
        match substitute(c) {
            Some(s) => substituted.push_str(s),
            None => substituted.push(c),
        }
    }

    let stripped = DISALLOWED_RE.replace_all(&substituted, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    clamp(collapsed)
}

/// Human-facing base name for a finished download: `ytdl-<artist>-<title>`, sanitized
///
/// A part with nothing left after sanitizing becomes [`UNKNOWN_PART`].
pub fn display_name(artist: &str, title: &str) -> String {
    let artist = sanitize_filename(artist);
    let title = sanitize_filename(title);
    clamp(format!(
        "{NAME_PREFIX}{}-{}",
        or_unknown(&artist),
        or_unknown(&title)
    ))
}

fn or_unknown(part: &str) -> &str {
    if part.is_empty() { UNKNOWN_PART } else { part }
}

// Input is ASCII by construction, so byte truncation is on a char boundary.
fn clamp(mut name: String) -> String {
    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
    }
    let trimmed = name.trim_end().len();
    name.truncate(trimmed);
    name
}
