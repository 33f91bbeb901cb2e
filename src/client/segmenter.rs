//! Sentence segmentation for speech.
//!
//! Answer text arrives in arbitrary slices. [`SentenceSegmenter`] keeps a
//! rolling buffer and releases a segment whenever a sentence ends, so speech
//! can start long before the answer is complete.

/// Default upper bound on a segment, in characters.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 180;

/// Find the end of the first complete sentence in `text`.
///
/// `. ! ?` and `\n` end a sentence when followed by whitespace (a decimal
/// point or a URL dot does not); `。！？` end one immediately. A terminator
/// at the very end only counts when `at_end` is set, because the next slice
/// might continue the token.
///
/// Returns the byte index just past the terminator.
pub fn find_sentence_boundary(text: &str, at_end: bool) -> Option<usize> {
    for (i, c) in text.char_indices() {
        let after = i + c.len_utf8();
        match c {
            '。' | '！' | '？' | '\n' => return Some(after),
            '.' | '!' | '?' => {
                let rest = &text[after..];
                match rest.chars().next() {
                    Some(next) if next.is_whitespace() => return Some(after),
                    None if at_end => return Some(after),
                    _ => {}
                }
            }
            _ => {}
        }
    }
    None
}

/// Rolling buffer that turns a growing answer into speakable segments.
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    buffer: String,
    max_chars: usize,
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEGMENT_CHARS)
    }
}

impl SentenceSegmenter {
    /// Create a segmenter; `max_chars` is clamped to at least 1.
    pub fn new(max_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            max_chars: max_chars.max(1),
        }
    }

    /// Append text and return every segment it completed.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let mut out = Vec::new();

        while let Some(end) = find_sentence_boundary(&self.buffer, false) {
            let rest = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            self.emit(&sentence, &mut out);
        }

        // A run-on without punctuation is released in full-size pieces.
        while self.buffer.chars().count() > self.max_chars {
            let split = byte_offset_of_char(&self.buffer, self.max_chars);
            let rest = self.buffer.split_off(split);
            let piece = std::mem::replace(&mut self.buffer, rest);
            self.emit(&piece, &mut out);
        }

        out
    }

    /// Release whatever remains, e.g. when the turn is done.
    pub fn flush(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        let mut out = Vec::new();
        self.emit(&rest, &mut out);
        out
    }

    /// Drop buffered text without emitting it.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Text held back waiting for a boundary.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn emit(&self, text: &str, out: &mut Vec<String>) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        out.extend(
            chunk_chars(trimmed, self.max_chars)
                .into_iter()
                .filter(|c| !c.trim().is_empty()),
        );
    }
}

/// Split `text` into pieces of at most `max_chars` characters.
pub fn chunk_chars(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

fn byte_offset_of_char(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map_or(text.len(), |(offset, _)| offset)
}
