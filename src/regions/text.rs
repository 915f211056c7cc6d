/// Strips characters OCR tends to hallucinate from frame borders and
/// collapses runs of whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|ch| !matches!(ch, '|' | '~' | '`'))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(super) fn join_inline(left: &str, right: &str) -> String {
    let left = left.trim_end();
    let right = right.trim_start();
    if left.is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    if needs_space(left, right) {
        format!("{} {}", left, right)
    } else {
        format!("{}{}", left, right)
    }
}

pub(super) fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => !(is_cjk(a) || is_cjk(b)),
        _ => false,
    }
}

/// Scripts written without spaces between words, plus their punctuation.
pub(super) fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x3040..=0x30FF
            | 0x31F0..=0x31FF
            | 0x3000..=0x303F
            | 0xFF00..=0xFFEF
    )
}
