//! Text-shaping helpers shared by the chunker, planner and answer strategies:
//! chapter heading detection, sentence splitting, header/name normalization
//! and RFC 4180 row rendering. Kept crate-free beyond `regex` and
//! `unicode-segmentation`, both already pulled in for other reasons.

use once_cell::sync::Lazy;
use regex::Regex;

/// `^\s*chapter\s+(\d+)\s*[\.\:\-]?\s*(.*)$`, case-insensitive.
static CHAPTER_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*chapter\s+(\d+)\s*[\.:\-]?\s*(.*)$").unwrap()
});

/// Scan the first six non-blank lines of `page` for a chapter heading.
/// Returns `(chapter_num, chapter_title)`, title trimmed and possibly empty.
pub fn detect_chapter_heading(page: &str) -> Option<(i64, String)> {
    page.lines()
        .filter(|l| !l.trim().is_empty())
        .take(6)
        .find_map(|line| {
            CHAPTER_HEADING.captures(line).and_then(|caps| {
                let num: i64 = caps.get(1)?.as_str().parse().ok()?;
                let title = caps
                    .get(2)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                Some((num, title))
            })
        })
}

/// Split `text` into sentences on `. ! ?` followed by whitespace and an
/// uppercase letter or an opening bracket. The `regex` crate has no
/// lookaround, so the boundary is found with an explicit char scan rather
/// than Python's `(?<=[.!?])\s+(?=[A-Z(\[])` lookbehind/lookahead pair;
/// fragments shorter than 3 chars (after trimming) are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < n {
        let c = chars[i];
        if c == '.' || c == '!' || c == '?' {
            // find run of whitespace following the terminator
            let mut j = i + 1;
            let mut saw_space = false;
            while j < n && chars[j].is_whitespace() {
                saw_space = true;
                j += 1;
            }
            if saw_space && j < n {
                let next = chars[j];
                if next.is_uppercase() || next == '(' || next == '[' {
                    let sentence: String = chars[start..=i].iter().collect();
                    push_sentence(&mut sentences, &sentence);
                    start = j;
                    i = j;
                    continue;
                }
            }
        }
        i += 1;
    }

    if start < n {
        let tail: String = chars[start..n].iter().collect();
        push_sentence(&mut sentences, &tail);
    }

    sentences
}

fn push_sentence(out: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.chars().count() >= 3 {
        out.push(trimmed.to_string());
    }
}

/// Lowercase, non-alphanumeric runs collapsed to a single `_`, trimmed of
/// leading/trailing `_`. Used for both tabular header and field-name
/// normalization so the two line up.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// Re-serialize one CSV row in RFC 4180 form: quote any field containing a
/// comma, quote, or newline, doubling embedded quotes.
pub fn to_rfc4180_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| {
            if f.contains(',') || f.contains('"') || f.contains('\n') || f.contains('\r') {
                format!("\"{}\"", f.replace('"', "\"\""))
            } else {
                f.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse one line of delimited text honoring RFC 4180 quoting, used for
/// both CSV and the re-serialized tab-joined spreadsheet rows.
pub fn parse_delimited_row(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    fields.push(current);
    fields
}

/// Format a whole-number currency amount with thousands separators, e.g.
/// `95000` -> `"95,000"`. Operates on the textual value as stored in a
/// tabular cell; non-numeric values pass through unchanged.
pub fn format_currency(raw: &str) -> String {
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('-');
    let digits_only: String = trimmed
        .trim_start_matches('-')
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if digits_only.is_empty() {
        return raw.to_string();
    }

    let mut parts = digits_only.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();

    if int_part.is_empty() {
        return raw.to_string();
    }

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let grouped: String = grouped.chars().rev().collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Split text on sentence-ending punctuation for the policy-summary
/// strategy; simpler than [`split_sentences`] (no chunk-boundary capital
/// check) because S-policy only needs a ranked bag of sentences.
pub fn split_sentences_loose(text: &str) -> Vec<String> {
    text.split(|c| c == '.' || c == '!' || c == '?')
        .map(str::trim)
        .filter(|s| s.chars().count() >= 3)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chapter_heading() {
        let page = "Some preamble\nChapter 3: Usage\nBody text follows.";
        assert_eq!(
            detect_chapter_heading(page),
            Some((3, "Usage".to_string()))
        );
    }

    #[test]
    fn detects_chapter_heading_without_title() {
        let page = "Chapter 1\nIntro text.";
        assert_eq!(detect_chapter_heading(page), Some((1, String::new())));
    }

    #[test]
    fn no_heading_beyond_six_lines() {
        let mut page = String::new();
        for i in 0..7 {
            page.push_str(&format!("line {}\n", i));
        }
        page.push_str("Chapter 9: Too late");
        assert_eq!(detect_chapter_heading(&page), None);
    }

    #[test]
    fn splits_on_terminator_then_capital() {
        let text = "Hello world. This is Sparta! Really? Yes.";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec!["Hello world.", "This is Sparta!", "Really?", "Yes."]
        );
    }

    #[test]
    fn drops_short_fragments() {
        let text = "Ok. To be continued. A. Next sentence starts here.";
        let sentences = split_sentences(text);
        assert!(sentences.iter().all(|s| s.chars().count() >= 3));
    }

    #[test]
    fn normalizes_header_names() {
        assert_eq!(normalize_header("Employee Name"), "employee_name");
        assert_eq!(normalize_header(" Annual-Salary!! "), "annual_salary");
        assert_eq!(normalize_header("Dept."), "dept");
    }

    #[test]
    fn rfc4180_round_trips_commas_and_quotes() {
        let fields = vec!["Akinkuolie, Sarah".to_string(), "He said \"hi\"".to_string()];
        let row = to_rfc4180_row(&fields);
        assert_eq!(row, "\"Akinkuolie, Sarah\",\"He said \"\"hi\"\"\"");
        let parsed = parse_delimited_row(&row, ',');
        assert_eq!(parsed, fields);
    }

    #[test]
    fn formats_currency_with_thousands_separators() {
        assert_eq!(format_currency("95000"), "95,000");
        assert_eq!(format_currency("1234567"), "1,234,567");
        assert_eq!(format_currency("500"), "500");
    }
}
