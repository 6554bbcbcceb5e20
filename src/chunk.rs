//! Paragraph-boundary text chunker with overlapping windows.
//!
//! Splits normalized text into fragments bounded by a target character
//! count. Paragraphs (`\n\n` units) are accumulated greedily to preserve
//! semantic coherence; any buffer that outgrows the target — including a
//! single oversized paragraph — is re-split with a sliding window so that
//! consecutive fragments share `overlap` characters and no character is
//! skipped.
//!
//! Fragments too short to carry retrievable meaning are dropped by a final
//! filter. All lengths are counted in characters, not bytes.

/// Minimum trimmed length an emitted chunk must have to survive the
/// post-filter: `min(80, target_size * 15%)`.
pub fn min_fragment_len(target_size: usize) -> usize {
    std::cmp::min(80, target_size * 15 / 100)
}

/// Split normalized text into overlapping chunks of at most `target_size`
/// characters. Empty (or whitespace-only) input yields no chunks; callers
/// must treat that as a hard ingestion failure.
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    if target_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize; // chars, kept alongside to avoid rescanning

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        let para_len = para.chars().count();

        // +2 accounts for the "\n\n" separator re-inserted between paragraphs
        let would_be = if buf.is_empty() {
            para_len
        } else {
            buf_len + 2 + para_len
        };

        if would_be > target_size && !buf.is_empty() {
            flush(&mut chunks, &buf, target_size, overlap);
            buf.clear();
            buf_len = 0;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
            buf_len += 2;
        }
        buf.push_str(para);
        buf_len += para_len;
    }

    if !buf.is_empty() {
        flush(&mut chunks, &buf, target_size, overlap);
    }

    let min_len = min_fragment_len(target_size);
    chunks.retain(|c| c.trim().chars().count() >= min_len);
    chunks
}

/// Emit a buffer: whole if it fits, otherwise through the sliding window.
fn flush(chunks: &mut Vec<String>, buf: &str, target_size: usize, overlap: usize) {
    if buf.chars().count() <= target_size {
        chunks.push(buf.to_string());
    } else {
        chunks.extend(sliding_windows(buf, target_size, overlap));
    }
}

/// Cover `text` with windows of `target_size` characters advancing by
/// `target_size - overlap`. The `max(1, …)` guard keeps the step positive
/// when `overlap >= target_size`, which would otherwise loop forever.
fn sliding_windows(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = std::cmp::max(1, target_size.saturating_sub(overlap));

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = std::cmp::min(chars.len(), start + target_size);
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(n: usize, fill: char) -> String {
        std::iter::repeat(fill).take(n).collect()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_text("", 800, 120).is_empty());
        assert!(chunk_text("   \n\n  ", 800, 120).is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let text = para(200, 'a');
        let chunks = chunk_text(&text, 800, 120);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_paragraphs_accumulate_until_target() {
        let text = format!("{}\n\n{}\n\n{}", para(300, 'a'), para(300, 'b'), para(300, 'c'));
        let chunks = chunk_text(&text, 800, 120);
        // a+b fit together (602 <= 800); c starts a new chunk
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a') && chunks[0].ends_with('b'));
        assert_eq!(chunks[1], para(300, 'c'));
    }

    #[test]
    fn test_every_chunk_within_size_bound() {
        let text = format!("{}\n\n{}\n\n{}", para(500, 'x'), para(2500, 'y'), para(90, 'z'));
        for size in [200, 800, 1000] {
            for overlap in [0, 50, 120] {
                for c in chunk_text(&text, size, overlap) {
                    assert!(
                        c.chars().count() <= size,
                        "chunk of {} chars exceeds size {}",
                        c.chars().count(),
                        size
                    );
                }
            }
        }
    }

    #[test]
    fn test_oversized_paragraph_windows_cover_everything() {
        let text: String = (0..2000u32)
            .map(|i| char::from_u32('a' as u32 + (i % 26)).unwrap())
            .collect();
        let (size, overlap) = (800, 120);
        let windows = sliding_windows(&text, size, overlap);
        assert!(windows.len() >= 2);

        // Each window after the first starts exactly `overlap` chars before
        // the previous one ended, so dropping that prefix and concatenating
        // must reconstruct the input with no gaps.
        let mut rebuilt = windows[0].clone();
        for w in &windows[1..] {
            let fresh: String = w.chars().skip(overlap).collect();
            rebuilt.push_str(&fresh);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_adjacent_windows_share_overlap() {
        let text = para(2000, ' ').replace(' ', "q"); // single 2000-char paragraph
        let chunks = chunk_text(&text, 800, 120);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let a: Vec<char> = pair[0].chars().collect();
            let b: Vec<char> = pair[1].chars().collect();
            let tail: String = a[a.len() - 120..].iter().collect();
            let head: String = b[..120].iter().collect();
            assert_eq!(tail, head, "adjacent chunks must share 120 chars");
        }
    }

    #[test]
    fn test_overlap_ge_target_is_clamped_not_looping() {
        // step would be <= 0 without the max(1, ...) guard
        let text = para(50, 'm');
        let windows = sliding_windows(&text, 10, 10);
        // step clamps to 1: one window per start position until the end
        assert_eq!(windows.len(), 41);
        assert!(windows.iter().all(|w| w.chars().count() <= 10));
    }

    #[test]
    fn test_short_fragment_filter() {
        // The trailing 40-char paragraph cannot join the 780-char buffer
        // (780 + 2 + 40 > 800), is flushed alone, and 40 < min(80, 120)
        // puts it below the retrievable-meaning floor.
        let text = format!("{}\n\n{}", para(780, 'a'), para(40, 'c'));
        let chunks = chunk_text(&text, 800, 120);
        assert_eq!(chunks, vec![para(780, 'a')]);
        assert!(chunks
            .iter()
            .all(|c| c.trim().chars().count() >= min_fragment_len(800)));
    }

    #[test]
    fn test_min_fragment_len_scales_down_for_small_targets() {
        assert_eq!(min_fragment_len(800), 80);
        assert_eq!(min_fragment_len(200), 30);
        assert_eq!(min_fragment_len(1000), 80);
    }

    #[test]
    fn test_two_paragraph_2000_char_document() {
        // Worked example: 2000 chars, size=800, overlap=120.
        let text = format!("{}\n\n{}", para(1000, 'a'), para(998, 'b'));
        let chunks = chunk_text(&text, 800, 120);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.chars().count() <= 800);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = format!("{}\n\n{}\n\n{}", para(900, 'a'), para(100, 'b'), para(2000, 'c'));
        assert_eq!(chunk_text(&text, 800, 120), chunk_text(&text, 800, 120));
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text: String = std::iter::repeat('é').take(3000).collect();
        let chunks = chunk_text(&text, 800, 120);
        assert!(!chunks.is_empty());
        for c in chunks {
            assert!(c.chars().count() <= 800);
        }
    }
}
