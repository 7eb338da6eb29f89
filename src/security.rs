//! XSS input filtering.
//!
//! `xss_remove` defangs markup smuggled through parameter values: control
//! characters are stripped, numeric HTML entities hiding printable ASCII are
//! folded back to plain characters, and known dangerous tag words are broken
//! with an inert `<x>` marker so browsers no longer recognize them.

use lazy_static::lazy_static;
use regex::Regex;

/// Tag and attribute words that get neutered when found in input.
pub const DEFAULT_TAGS: &[&str] = &[
    "javascript",
    "vbscript",
    "expression",
    "applet",
    "meta",
    "xml",
    "blink",
    "script",
    "embed",
    "object",
    "iframe",
    "frame",
    "frameset",
    "ilayer",
    "layer",
    "bgsound",
    "base",
    "onabort",
    "onblur",
    "onchange",
    "onclick",
    "ondblclick",
    "onerror",
    "onfocus",
    "onkeydown",
    "onkeypress",
    "onkeyup",
    "onload",
    "onmousedown",
    "onmousemove",
    "onmouseout",
    "onmouseover",
    "onmouseup",
    "onreset",
    "onselect",
    "onsubmit",
    "onunload",
];

lazy_static! {
    static ref CONTROL_CHARS: Regex =
        Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f]").unwrap();
    static ref HEX_ENTITY: Regex = Regex::new(r"(?i)&#x0{0,8}([0-9a-f]{1,6});?").unwrap();
    static ref DEC_ENTITY: Regex = Regex::new(r"&#0{0,8}([0-9]{1,7});?").unwrap();
}

/// Filter a value for markup-based injection. Idempotent once the output
/// stabilizes; the neutering loop runs until a full pass changes nothing.
pub fn xss_remove(value: &str) -> String {
    let mut val = CONTROL_CHARS.replace_all(value, "").into_owned();

    val = decode_entities(&HEX_ENTITY, &val, 16);
    val = decode_entities(&DEC_ENTITY, &val, 10);

    loop {
        let before = val.clone();
        for tag in DEFAULT_TAGS {
            val = neuter_tag(&val, tag);
        }
        if val == before {
            break;
        }
    }

    val
}

/// Fold numeric entities back to their characters, but only for printable
/// ASCII. Entities for anything else stay untouched.
fn decode_entities(re: &Regex, input: &str, radix: u32) -> String {
    re.replace_all(input, |caps: &regex::Captures| {
        let digits = &caps[1];
        match u32::from_str_radix(digits, radix)
            .ok()
            .and_then(char::from_u32)
        {
            Some(c) if c.is_ascii_graphic() || c == ' ' => c.to_string(),
            _ => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Break every case-insensitive occurrence of `tag` by splicing `<x>` after
/// its first two characters.
fn neuter_tag(input: &str, tag: &str) -> String {
    let lower_input = input.to_ascii_lowercase();
    let lower_tag = tag.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut pos = 0;

    while let Some(found) = lower_input[pos..].find(&lower_tag) {
        let start = pos + found;
        let end = start + tag.len();
        out.push_str(&input[pos..start + 2]);
        out.push_str("<x>");
        out.push_str(&input[start + 2..end]);
        pos = end;
    }
    out.push_str(&input[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(xss_remove("hello world 42"), "hello world 42");
    }

    #[test]
    fn test_control_chars_stripped() {
        assert_eq!(xss_remove("a\x01b\x0bc"), "abc");
    }

    #[test]
    fn test_script_tag_is_neutered() {
        let out = xss_remove("<script>alert(1)</script>");
        assert!(out.contains("sc<x>ript"));
        assert!(!out.contains("<script>"));
    }

    #[test]
    fn test_case_insensitive_neutering() {
        let out = xss_remove("<ScRiPt>x</ScRiPt>");
        assert!(out.to_lowercase().contains("sc<x>ript"));
    }

    #[test]
    fn test_hex_entities_are_decoded_then_caught() {
        // &#x6A;&#x61;... spells "javascript"
        let input = "&#x6A;&#x61;&#x76;&#x61;&#x73;&#x63;&#x72;&#x69;&#x70;&#x74;:alert(1)";
        let out = xss_remove(input);
        assert!(out.contains("ja<x>vascript"));
    }

    #[test]
    fn test_decimal_entities_are_decoded() {
        assert_eq!(xss_remove("&#0000064;"), "@");
    }

    #[test]
    fn test_non_ascii_entities_left_alone() {
        assert_eq!(xss_remove("&#128512;"), "&#128512;");
    }

    #[test]
    fn test_output_is_stable() {
        let once = xss_remove("<iframe src=x onload=evil()>");
        let twice = xss_remove(&once);
        assert_eq!(once, twice);
    }
}
