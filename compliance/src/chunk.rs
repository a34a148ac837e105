//! Overlapping passage splitter.
//!
//! Text is cut into sentence units (paragraph breaks always end a unit) and
//! packed into passages of at most `max_chars` characters. Each passage
//! after the first repeats the tail of the previous one, cut on a word
//! boundary. Units too long for the space left are split at whitespace.

use std::collections::VecDeque;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?') || is_wide_terminator(c)
}

fn is_wide_terminator(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

/// Splits a paragraph into sentences. A sentence ends at a full-width
/// terminator, or at an ASCII one followed by whitespace or the end of the
/// paragraph.
fn sentences(paragraph: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = paragraph.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(if c == '\n' { ' ' } else { c });
        let boundary = is_wide_terminator(c)
            || (is_terminator(c) && chars.peek().is_none_or(|n| n.is_whitespace()));
        if boundary {
            let s = current.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
            current.clear();
        }
    }
    let s = current.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
    out
}

fn units(text: &str) -> VecDeque<String> {
    text.split("\n\n").flat_map(sentences).collect()
}

/// Splits `unit` so the head holds at most `room` characters, cutting at the
/// last whitespace inside the window when there is one.
fn split_unit(unit: &str, room: usize) -> (String, String) {
    let chars: Vec<char> = unit.chars().collect();
    if chars.len() <= room {
        return (unit.to_string(), String::new());
    }
    let cut = match chars[..=room].iter().rposition(|c| c.is_whitespace()) {
        Some(ws) if ws > 0 => ws,
        _ => room,
    };
    let head: String = chars[..cut].iter().collect();
    let rest: String = chars[cut..].iter().collect();
    (head.trim_end().to_string(), rest.trim_start().to_string())
}

/// Trailing text of `chunk`, at most `overlap` characters, starting on a
/// word boundary. Text without whitespace is cut at the character.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = chunk.chars().collect();
    if chars.len() <= overlap {
        return chunk.to_string();
    }
    let start = chars.len() - overlap;
    let tail = &chars[start..];
    if chars[start - 1].is_whitespace() {
        return tail.iter().collect::<String>().trim().to_string();
    }
    match tail.iter().position(|c| c.is_whitespace()) {
        Some(ws) => tail[ws..].iter().collect::<String>().trim().to_string(),
        None => tail.iter().collect(),
    }
}

/// Splits `text` into passages of at most `max_chars` characters. Each
/// passage after the first opens with up to `overlap_chars` characters of
/// the previous one, so text spanning a boundary is whole in one of them.
/// Overlap is capped at half a passage.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let overlap = overlap_chars.min(max_chars / 2);

    let mut chunks = Vec::new();
    let mut queue = units(text);
    let mut current = String::new();
    // Whether `current` holds text beyond the carried-over overlap.
    let mut fresh = false;

    while let Some(unit) = queue.pop_front() {
        let len = char_len(&current);
        let sep = usize::from(len > 0);
        if len + sep + char_len(&unit) <= max_chars {
            if sep == 1 {
                current.push(' ');
            }
            current.push_str(&unit);
            fresh = true;
            continue;
        }
        if fresh {
            chunks.push(std::mem::take(&mut current));
            if let Some(last) = chunks.last() {
                current = overlap_tail(last, overlap);
            }
            fresh = false;
            queue.push_front(unit);
            continue;
        }

        // Only overlap left and the unit still does not fit: split it.
        let room = max_chars.saturating_sub(len + sep);
        if room == 0 {
            current.clear();
            queue.push_front(unit);
            continue;
        }
        let (head, rest) = split_unit(&unit, room);
        if sep == 1 {
            current.push(' ');
        }
        current.push_str(&head);
        fresh = true;
        if !rest.is_empty() {
            queue.push_front(rest);
        }
    }
    if fresh {
        chunks.push(current);
    }
    chunks
}
