//! Text sanitization applied to every user-facing string crossing the
//! backend boundary: titles, previews, descriptions, message bodies.

/// Cap for full-length text fields (titles, descriptions, message bodies).
pub const MAX_TEXT_CHARS: usize = 1000;
/// Cap for last-message previews embedded in chat summaries.
pub const MAX_PREVIEW_CHARS: usize = 100;
/// Cap for backend error messages surfaced to the user.
pub const MAX_ERROR_CHARS: usize = 200;

/// Strips C0/C1 control characters and surrogate code units, trims
/// surrounding whitespace, and truncates to `max_chars`.
pub fn sanitize(input: &str, max_chars: usize) -> String {
    let cleaned: String = input.chars().filter(|c| !is_stripped(*c)).collect();
    truncate_chars(cleaned.trim(), max_chars)
}

pub fn sanitize_text(input: &str) -> String {
    sanitize(input, MAX_TEXT_CHARS)
}

pub fn sanitize_preview(input: &str) -> String {
    sanitize(input, MAX_PREVIEW_CHARS)
}

fn is_stripped(c: char) -> bool {
    // char::is_control covers C0, DEL and the C1 block. Surrogate code
    // units cannot normally appear in a Rust string, but backend blobs
    // decoded leniently upstream may smuggle them through as raw scalars.
    c.is_control() || matches!(c as u32, 0xD800..=0xDFFF)
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = input.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}
