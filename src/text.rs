// =============================================================================
// text.rs — THE SCRUBBER
// =============================================================================
//
// Job descriptions arrive wrapped in whatever the CMS felt like emitting:
// <p> tags, &nbsp; entities, bullet glyphs, SHOUTING_SNAKE_CASE headings.
// normalize() scrubs all of that down to lowercase words and whitespace.
//
// Markup is located with memchr (SIMD byte scanning) since '<' and '&' are
// ASCII and every UTF-8 continuation byte is >= 0x80. Slicing at those
// positions is always a char boundary.
// =============================================================================

use memchr::{memchr, memchr2};

/// Normalize raw text for keyword extraction.
///
/// Removes `<...>` tags (a tag never spans a newline) and HTML entities,
/// lowercases, drops every character that is not alphanumeric, underscore
/// or whitespace, and finally turns each run of underscores into a single
/// space. Total and idempotent.
pub fn normalize(text: &str) -> String {
    let stripped = strip_markup(text);
    let lowered = stripped.to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut in_underscores = false;
    for ch in lowered.chars() {
        if ch == '_' {
            if !in_underscores {
                out.push(' ');
                in_underscores = true;
            }
            continue;
        }
        if ch.is_alphanumeric() || ch.is_whitespace() {
            out.push(ch);
            in_underscores = false;
        }
    }
    out
}

/// Remove tags and entities, leaving everything else untouched.
fn strip_markup(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;

    while let Some(offset) = memchr2(b'<', b'&', &bytes[pos..]) {
        let start = pos + offset;
        out.push_str(&text[pos..start]);

        let skip = if bytes[start] == b'<' {
            tag_len(&bytes[start..])
        } else {
            entity_len(&bytes[start..])
        };

        match skip {
            Some(len) => pos = start + len,
            None => {
                // Not markup after all; keep the byte and move on.
                out.push(bytes[start] as char);
                pos = start + 1;
            }
        }
    }

    out.push_str(&text[pos..]);
    out
}

/// Length of a `<...>` tag starting at `bytes[0]`, if it closes before a newline.
fn tag_len(bytes: &[u8]) -> Option<usize> {
    let close = memchr(b'>', &bytes[1..])? + 1;
    match memchr(b'\n', &bytes[1..close]) {
        Some(_) => None,
        None => Some(close + 1),
    }
}

/// Length of an entity (`&amp;`, `&#39;`, `&#x2F;`) starting at `bytes[0]`.
fn entity_len(bytes: &[u8]) -> Option<usize> {
    let mut idx = 1;
    if bytes.get(idx) == Some(&b'#') {
        idx += 1;
    }
    let body_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_alphanumeric() {
        idx += 1;
    }
    if idx > body_start && bytes.get(idx) == Some(&b';') {
        Some(idx + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags_and_punctuation() {
        assert_eq!(
            normalize("<p>Hello, <b>World</b>!</p>"),
            "hello world"
        );
    }

    #[test]
    fn test_strips_entities() {
        assert_eq!(normalize("Fish&nbsp;&amp;&#39;Chips&#x2F;"), "fishchips");
        // A bare ampersand is just punctuation.
        assert_eq!(normalize("R & D"), "r  d");
    }

    #[test]
    fn test_underscores_collapse_to_single_space() {
        assert_eq!(normalize("CLIMATE___ACTION_lead"), "climate action lead");
        // Punctuation is gone before underscores are collapsed.
        assert_eq!(normalize("tech_!_good"), "tech good");
    }

    #[test]
    fn test_tag_does_not_span_newline() {
        assert_eq!(normalize("a < b\nc > d"), "a  b\nc  d");
    }

    #[test]
    fn test_unicode_letters_survive() {
        assert_eq!(normalize("Développement Durable"), "développement durable");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "",
            "plain words",
            "<div class=\"x\">Tech__for__Good!</div>",
            "&lt;b&gt;bold&lt;/b&gt; & more",
            "İstanbul ÅNGSTRÖM ß",
            "<<a>b> ___ _x_",
            "line one\n<tag\nnot a tag> done.",
            "emoji 🌍 and — dashes … ellipses",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }
}
