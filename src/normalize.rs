//! Raw text canonicalization.
//!
//! Extracted document text arrives with platform line endings, tab
//! indentation, and arbitrary runs of blank lines. [`normalize`] applies a
//! fixed sequence of rules so the chunker only ever sees `\n`-separated
//! paragraphs delimited by exactly one blank line.

/// Canonicalize raw extracted text. Pure and idempotent.
///
/// Rules, in order:
/// 1. carriage returns (and CRLF pairs) become newlines
/// 2. tabs and non-breaking spaces become single spaces
/// 3. runs of three or more newlines collapse to exactly two
/// 4. leading/trailing whitespace is trimmed
pub fn normalize(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut newline_run = 0usize;
    for c in unified.chars() {
        let c = match c {
            '\t' | '\u{a0}' => ' ',
            other => other,
        };
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push('\n');
            }
        } else {
            newline_run = 0;
            out.push(c);
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carriage_returns_become_newlines() {
        assert_eq!(normalize("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_tabs_and_nbsp_become_spaces() {
        assert_eq!(normalize("a\tb\u{a0}c"), "a b c");
    }

    #[test]
    fn test_collapses_blank_line_runs() {
        assert_eq!(normalize("one\n\n\n\n\ntwo"), "one\n\ntwo");
    }

    #[test]
    fn test_preserves_single_paragraph_break() {
        assert_eq!(normalize("one\n\ntwo"), "one\n\ntwo");
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        assert_eq!(normalize("  \n hello \n  "), "hello");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  \t \r\n "), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "plain",
            "a\r\n\r\n\r\nb\tc\u{a0}d",
            "  mixed \n\n\n\n content \r here  ",
            "",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }
}
