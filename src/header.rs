//! Regex-driven extraction and in-place substitution of named scalar fields
//! inside an SPM text header.
//!
//! The header is just a UTF-8 string, each line starting with `\`. Every
//! operation here is a free function over `&str`/`&mut String` rather than a
//! type with methods: the original reader used an inheritance chain purely
//! to share these helpers, but there is no state to carry between calls, so
//! a little module of functions does the same job.

use regex::Regex;

/// Nanometer multiplier for a unit suffix as it appears after a header value
/// (`nm`, `um`/`µm`, `mm`). Unrecognized units normalize to `0`, matching the
/// "unknown unit -> 0" rule.
fn unit_to_nm_factor(unit: &str) -> f64 {
    match unit.trim() {
        "nm" => 1.0,
        "um" | "µm" => 1_000.0,
        "mm" => 1_000_000.0,
        _ => 0.0,
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|error| {
        panic!("invalid header regex pattern {:?}: {}", pattern, error)
    })
}

/// First capture group of `pattern` in `text`, parsed as a signed integer.
/// Returns `0` if the pattern does not match or the capture is not a valid integer.
pub fn get_int(text: &str, pattern: &str) -> i64 {
    compile(pattern).captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|capture| capture.as_str().parse().ok())
        .unwrap_or(0)
}

/// First capture group of `pattern` in `text`, parsed as a double.
/// Returns `0.0` if the pattern does not match or the capture is not a valid number.
pub fn get_double(text: &str, pattern: &str) -> f64 {
    compile(pattern).captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|capture| capture.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// First capture group of `pattern` in `text`, as a plain string.
/// Returns an empty string if the pattern does not match.
pub fn get_string(text: &str, pattern: &str) -> String {
    compile(pattern).captures(text)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str().to_owned())
        .unwrap_or_default()
}

/// Captures `(value, unit)` via `pattern` (capture group 1 = numeric value,
/// group 2 = unit suffix) and normalizes the result to nanometers.
pub fn get_value_with_unit(text: &str, pattern: &str) -> f64 {
    let regex = compile(pattern);
    let captures = match regex.captures(text) {
        Some(captures) => captures,
        None => return 0.0,
    };

    let value: f64 = captures.get(1)
        .and_then(|capture| capture.as_str().parse().ok())
        .unwrap_or(0.0);

    let unit = captures.get(2).map(|capture| capture.as_str()).unwrap_or("");
    value * unit_to_nm_factor(unit)
}

/// Locates the first capture group's span for `pattern` in `text` and splices
/// in the decimal representation of `new`, leaving every other byte untouched
/// (surrounding whitespace and punctuation included). Returns `false` if the
/// pattern did not match.
pub fn replace_int(text: &mut String, pattern: &str, new: i64) -> bool {
    replace_capture(text, pattern, &new.to_string())
}

/// Splices the decimal representation of `new` into the first capture group's
/// span, the same way as [`replace_int`] but for a floating-point value.
pub fn replace_double(text: &mut String, pattern: &str, new: f64) -> bool {
    replace_capture(text, pattern, &new.to_string())
}

fn replace_capture(text: &mut String, pattern: &str, replacement: &str) -> bool {
    let regex = compile(pattern);

    let span = match regex.captures(text).and_then(|captures| captures.get(1)) {
        Some(capture) => capture.range(),
        None => return false,
    };

    text.replace_range(span, replacement);
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_int_extracts_first_capture() {
        let text = "\\Samps/line: 256\r\n";
        assert_eq!(get_int(text, r"\\Samps/line: (\d+)"), 256);
    }

    #[test]
    fn get_int_defaults_to_zero_when_absent() {
        assert_eq!(get_int("no such field here", r"\\Samps/line: (\d+)"), 0);
    }

    #[test]
    fn get_double_extracts_decimal() {
        let text = "\\Relative frame time: 12.5\r\n";
        assert_eq!(get_double(text, r"\\Relative frame time: (\d+(?:\.\d+)?)"), 12.5);
    }

    #[test]
    fn get_string_extracts_label() {
        let text = "\\@2:Image Data: S [HeightTrace] \"Height\"\r\n";
        assert_eq!(get_string(text, r#"\\@2:Image Data: S \[.*?\] "(.*?)""#), "Height");
    }

    #[test]
    fn get_value_with_unit_normalizes_nm() {
        let text = "\\Engage X Pos: 1.5 um\r\n";
        let nm = get_value_with_unit(text, r"\\Engage X Pos: ([0-9.-]+) ([a-zA-Z]+)");
        assert_eq!(nm, 1500.0);
    }

    #[test]
    fn get_value_with_unit_nm_and_um_agree() {
        let nm_pattern = r"\\Engage X Pos: ([0-9.-]+) ([a-zA-Z]+)";
        let a = get_value_with_unit("\\Engage X Pos: 1500 nm\r\n", nm_pattern);
        let b = get_value_with_unit("\\Engage X Pos: 1.5 um\r\n", nm_pattern);
        assert_eq!(a, b);
    }

    #[test]
    fn replace_int_preserves_surrounding_bytes() {
        let mut text = String::from("\\Samps/line: 256\r\n\\Number of lines: 256\r\n");
        assert!(replace_int(&mut text, r"\\Samps/line: (\d+)", 512));
        assert_eq!(text, "\\Samps/line: 512\r\n\\Number of lines: 256\r\n");
    }

    #[test]
    fn replace_double_splices_only_the_capture() {
        let mut text = String::from("\\Relative frame time: 12.5\r\n");
        assert!(replace_double(&mut text, r"\\Relative frame time: (\d+(?:\.\d+)?)", 3.25));
        assert_eq!(text, "\\Relative frame time: 3.25\r\n");
    }

    #[test]
    fn replace_returns_false_when_pattern_absent() {
        let mut text = String::from("nothing to see here");
        assert!(!replace_int(&mut text, r"\\Samps/line: (\d+)", 1));
        assert_eq!(text, "nothing to see here");
    }
}
