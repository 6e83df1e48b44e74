use std::{collections::HashMap, sync::OnceLock, time::Duration};

// https://en.wikipedia.org/wiki/Transformation_of_text#Upside-down_text
const LOWER: [char; 26] = [
    '\u{007A}', '\u{028E}', '\u{0078}', '\u{028D}', '\u{028C}', '\u{006E}', '\u{0287}', '\u{0073}',
    '\u{0279}', '\u{0062}', '\u{0064}', '\u{006F}', '\u{0075}', '\u{026F}', '\u{006C}', '\u{029E}',
    '\u{017F}', '\u{1D09}', '\u{0265}', '\u{0253}', '\u{025F}', '\u{01DD}', '\u{0070}', '\u{0254}',
    '\u{0071}', '\u{0250}',
];
const UPPER: [char; 26] = [
    '\u{005A}', '\u{2144}', '\u{0058}', '\u{004D}', '\u{039B}', '\u{0548}', '\u{A7B1}', '\u{0053}',
    '\u{1D1A}', '\u{10E2}', '\u{0500}', '\u{004F}', '\u{004E}', '\u{A7FD}', '\u{2142}', '\u{A4D8}',
    '\u{017F}', '\u{0049}', '\u{0048}', '\u{2141}', '\u{2132}', '\u{018E}', '\u{15E1}', '\u{0186}',
    '\u{15FA}', '\u{2200}',
];
const DIGITS: [char; 10] = [
    '\u{0036}', '\u{0038}', '\u{3125}', '\u{0039}', '\u{100C}', '\u{07C8}', '\u{218B}', '\u{218A}',
    '\u{21C2}', '\u{0030}',
];
const PUNCT_FROM: &str = "&_?!\"'.,;";
const PUNCT_TO: [char; 9] = [
    '\u{214B}', '\u{203E}', '\u{00BF}', '\u{00A1}', '\u{201E}', '\u{002C}', '\u{02D9}', '\u{0027}',
    '\u{061B}',
];

/// Twitch rejects chat messages longer than this many bytes.
pub const MAX_MESSAGE_LEN: usize = 500;

fn flip_map() -> &'static HashMap<char, char> {
    static MAP: OnceLock<HashMap<char, char>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut map = HashMap::new();
        // each table is stored back to front
        for (from, table) in [('a', &LOWER[..]), ('A', &UPPER[..]), ('0', &DIGITS[..])] {
            for (offset, flipped) in table.iter().rev().enumerate() {
                if let Some(c) = char::from_u32(from as u32 + offset as u32) {
                    map.insert(c, *flipped);
                }
            }
        }
        for (c, flipped) in PUNCT_FROM.chars().zip(PUNCT_TO) {
            map.insert(c, flipped);
        }
        for (open, close) in [('(', ')'), ('{', '}'), ('[', ']')] {
            map.insert(open, close);
            map.insert(close, open);
        }
        map
    })
}

/// Reverses `text` and swaps every mappable character for its upside-down twin.
pub fn upside_down(text: &str) -> String {
    let map = flip_map();
    text.chars().rev().map(|c| *map.get(&c).unwrap_or(&c)).collect()
}

/// Splits `text` on spaces into chunks of at most `size` bytes. Words longer than
/// `size` stay whole.
pub fn word_wrap(text: &str, size: usize) -> Vec<String> {
    if text.len() <= size {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut acc = String::new();
    for word in text.split(' ') {
        if acc.is_empty() {
            acc.push_str(word);
        } else if acc.len() + 1 + word.len() > size {
            lines.push(std::mem::replace(&mut acc, word.to_string()));
        } else {
            acc.push(' ');
            acc.push_str(word);
        }
    }
    let trimmed = acc.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_string());
    }
    lines
}

/// Cuts `text` to at most `max` bytes on a char boundary, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    const ELLIPSIS: &str = "…";
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max.saturating_sub(ELLIPSIS.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ELLIPSIS}", &text[..end])
}

/// "1 day, 3 hours and 5 seconds". Anything under a second reads as "0 seconds".
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [
        (30 * 24 * 3600, "month"),
        (24 * 3600, "day"),
        (3600, "hour"),
        (60, "minute"),
    ];
    let plural = |count: u64, unit: &str| {
        if count == 1 {
            format!("{count} {unit}")
        } else {
            format!("{count} {unit}s")
        }
    };

    let mut left = duration.as_secs();
    let mut parts = Vec::new();
    for (size, unit) in UNITS {
        if left >= size {
            parts.push(plural(left / size, unit));
            left %= size;
        }
    }
    let seconds = plural(left, "second");
    match parts.len() {
        0 => seconds,
        _ if left == 0 => parts.join(", "),
        _ => format!("{} and {seconds}", parts.join(", ")),
    }
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", "")]
    #[case("abc", "ɔqɐ")]
    #[case("Hello!", "¡ollǝH")]
    #[case("(ok) 123", "\u{218B}\u{218A}\u{21C2} (\u{029E}o)")]
    #[case("ç", "ç")]
    fn flips_text(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(upside_down(input), expected);
    }

    #[rstest]
    #[case("", 0, vec![""])]
    #[case("", 10, vec![""])]
    #[case("abc", 10, vec!["abc"])]
    #[case("abc def ghi jkl", 10, vec!["abc def", "ghi jkl"])]
    #[case("abcdefghijk l", 10, vec!["abcdefghijk", "l"])]
    #[case("a bcdefghijkl", 10, vec!["a", "bcdefghijkl"])]
    fn wraps_words(#[case] input: &str, #[case] size: usize, #[case] expected: Vec<&str>) {
        assert_eq!(word_wrap(input, size), expected);
    }

    #[test]
    fn wrapped_lines_respect_the_limit() {
        let text = "https://twitch.tv/someone ".repeat(60);
        let lines = word_wrap(text.trim_end(), MAX_MESSAGE_LEN);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|line| line.len() <= MAX_MESSAGE_LEN));
        assert_eq!(lines.join(" "), text.trim_end());
    }

    #[rstest]
    #[case("short", 10, "short")]
    #[case("exactly10!", 10, "exactly10!")]
    #[case("a bit too long", 10, "a bit t…")]
    #[case("ééééé", 6, "é…")]
    fn truncates_on_char_boundaries(
        #[case] input: &str,
        #[case] max: usize,
        #[case] expected: &str,
    ) {
        let cut = truncate(input, max);
        assert_eq!(cut, expected);
        assert!(cut.len() <= max);
    }

    #[rstest]
    #[case(0, "0 seconds")]
    #[case(1, "1 second")]
    #[case(59, "59 seconds")]
    #[case(60, "1 minute")]
    #[case(3 * 3600 + 2 * 60 + 5, "3 hours, 2 minutes and 5 seconds")]
    #[case(24 * 3600 + 1, "1 day and 1 second")]
    #[case(65 * 24 * 3600, "2 months, 5 days")]
    fn formats_durations(#[case] seconds: u64, #[case] expected: &str) {
        assert_eq!(format_duration(Duration::from_secs(seconds)), expected);
    }

    #[rstest]
    #[case("", "")]
    #[case("unknown field", "Unknown field")]
    #[case("élan", "Élan")]
    fn capitalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(capitalize_first(input), expected);
    }
}
