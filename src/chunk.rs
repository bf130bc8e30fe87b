//! Sliding-window text chunker for paper abstracts.
//!
//! Windows are measured in characters, not bytes, so Korean and other
//! multi-byte text splits on character boundaries. A window that would
//! end mid-text is pulled back to its last `.` or newline when that
//! boundary lies past the window's midpoint. Consecutive windows share
//! `overlap` characters.

/// Split `text` into trimmed, non-empty chunks.
///
/// `overlap` is clamped below `chunk_size`. Every window starts after the
/// previous one, so the loop always terminates.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = trimmed.chars().collect();
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let mut end = (start + chunk_size).min(chars.len());
        if end < chars.len() {
            let window = &chars[start..end];
            let cut = window.iter().rposition(|&c| c == '.' || c == '\n');
            if let Some(cut) = cut.filter(|&cut| cut > chunk_size / 2) {
                end = start + cut + 1;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= chars.len() {
            break;
        }
        // A sentence cut can shrink the window to the overlap or below;
        // then the next window starts fresh at the cut.
        start = if end - start > overlap { end - overlap } else { end };
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 500, 80).is_empty());
        assert!(chunk_text("   \n ", 500, 80).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("  Vitamin D supports bone health.  ", 500, 80);
        assert_eq!(chunks, vec!["Vitamin D supports bone health.".to_string()]);
    }

    #[test]
    fn test_breaks_on_sentence_boundary() {
        let text = format!("{}. {}", "a".repeat(70), "b".repeat(60));
        let chunks = chunk_text(&text, 100, 10);
        assert_eq!(chunks[0], format!("{}.", "a".repeat(70)));
        assert!(chunks.len() >= 2);
        assert!(chunks.last().unwrap().ends_with('b'));
    }

    #[test]
    fn test_early_boundary_is_ignored() {
        let text = format!("ab.{}", "c".repeat(200));
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks[0].chars().count(), 100);
    }

    #[test]
    fn test_windows_overlap() {
        let text: String = ('a'..='z').cycle().take(250).collect();
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks.len(), 3);
        let tail: String = chunks[0].chars().skip(80).collect();
        let head: String = chunks[1].chars().take(20).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn test_wide_overlap_after_sentence_cut_terminates() {
        let text = format!("{}.{}", "a".repeat(60), "b".repeat(200));
        let chunks = chunk_text(&text, 100, 90);
        assert_eq!(chunks[0], format!("{}.", "a".repeat(60)));
        assert_eq!(chunks[1], "b".repeat(100));
        assert!(chunks.last().unwrap().ends_with('b'));
        assert_eq!(chunks.len(), 12);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "가".repeat(1200);
        let chunks = chunk_text(&text, 500, 80);
        assert!(chunks.iter().all(|c| c.chars().count() <= 500));
        assert_eq!(chunks.len(), 3);
    }
}
