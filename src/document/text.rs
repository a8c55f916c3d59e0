//! Plain-text matching shared by both engines

/// Match span in characters (end exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMatch {
    pub start: usize,
    pub end: usize,
}

/// Non-overlapping occurrences of `needle` in `haystack`.
///
/// Offsets index `haystack`. Case-insensitive matching folds with
/// Unicode lowercase, so a match can differ in length after folding.
pub fn find_all(haystack: &[char], needle: &str, case_sensitive: bool) -> Vec<TextMatch> {
    if needle.trim().is_empty() || haystack.is_empty() {
        return Vec::new();
    }

    // folded[i] came from haystack[origin[i]]
    let mut folded = Vec::with_capacity(haystack.len());
    let mut origin = Vec::with_capacity(haystack.len());
    for (i, c) in haystack.iter().enumerate() {
        if case_sensitive {
            folded.push(*c);
            origin.push(i);
        } else {
            for lc in c.to_lowercase() {
                folded.push(lc);
                origin.push(i);
            }
        }
    }
    let pattern: Vec<char> = if case_sensitive {
        needle.chars().collect()
    } else {
        needle.chars().flat_map(char::to_lowercase).collect()
    };

    let mut matches = Vec::new();
    let mut i = 0;
    while i + pattern.len() <= folded.len() {
        if folded[i..i + pattern.len()] == pattern[..] {
            let start = origin[i];
            let end = origin[i + pattern.len() - 1] + 1;
            // A match must start on a whole original character
            if i == 0 || origin[i - 1] != start {
                matches.push(TextMatch { start, end });
                i += pattern.len();
                continue;
            }
        }
        i += 1;
    }
    matches
}

/// Up to `len` characters on each side of a match, whitespace collapsed
pub fn context(haystack: &[char], m: TextMatch, len: usize) -> (Option<String>, Option<String>) {
    if len == 0 {
        return (None, None);
    }
    let before = &haystack[m.start.saturating_sub(len)..m.start];
    let after = &haystack[m.end..(m.end + len).min(haystack.len())];
    (collapse(before), collapse(after))
}

fn collapse(chars: &[char]) -> Option<String> {
    let s: String = chars.iter().collect();
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Characters of the span as a string
pub fn slice(haystack: &[char], m: TextMatch) -> String {
    haystack[m.start..m.end].iter().collect()
}
