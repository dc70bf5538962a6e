//! Line table for one generated script.
//!
//! Parser spans are byte offsets, while V8 offsets and source-map columns count
//! UTF-16 code units. Everything that crosses that boundary goes through here.

use memchr::memchr3_iter;

use crate::source_coverage::Location;

#[derive(Debug, Clone)]
pub struct SourceText<'s> {
    text: &'s str,
    /// Byte offset of each line start.
    line_starts: Vec<u32>,
    /// UTF-16 offset of each line start; empty when the text is ASCII.
    utf16_line_starts: Vec<u32>,
}

impl<'s> SourceText<'s> {
    pub fn new(text: &'s str) -> Self {
        let bytes = text.as_bytes();
        let mut line_starts = vec![0];
        // JS line terminators: \n, \r\n, \r, U+2028, U+2029 (E2 80 A8 / E2 80 A9).
        for pos in memchr3_iter(b'\n', b'\r', 0xE2, bytes) {
            match bytes[pos] {
                b'\n' => line_starts.push(pos as u32 + 1),
                b'\r' if bytes.get(pos + 1) != Some(&b'\n') => line_starts.push(pos as u32 + 1),
                0xE2 if bytes.get(pos + 1) == Some(&0x80)
                    && matches!(bytes.get(pos + 2), Some(0xA8 | 0xA9)) =>
                {
                    line_starts.push(pos as u32 + 3)
                }
                _ => {}
            }
        }

        let utf16_line_starts = if text.is_ascii() {
            Vec::new()
        } else {
            let mut starts = Vec::with_capacity(line_starts.len());
            let mut utf16 = 0u32;
            let mut prev = 0usize;
            for &start in &line_starts {
                utf16 += text[prev..start as usize].encode_utf16().count() as u32;
                starts.push(utf16);
                prev = start as usize;
            }
            starts
        };

        Self {
            text,
            line_starts,
            utf16_line_starts,
        }
    }

    pub fn text(&self) -> &'s str {
        self.text
    }

    pub fn len(&self) -> u32 {
        self.text.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Zero-based line index containing `offset`.
    fn line_index(&self, offset: u32) -> usize {
        self.line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1)
    }

    fn clamp(&self, offset: u32) -> usize {
        let mut offset = (offset as usize).min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    /// Zero-based line and UTF-16 column of a byte offset.
    pub fn line_column(&self, offset: u32) -> (u32, u32) {
        let offset = self.clamp(offset);
        let line = self.line_index(offset as u32);
        let line_start = self.line_starts[line] as usize;
        let column = if self.utf16_line_starts.is_empty() {
            offset - line_start
        } else {
            self.text[line_start..offset].encode_utf16().count()
        };
        (line as u32, column as u32)
    }

    /// Istanbul location (1-based line) of a byte offset.
    pub fn location(&self, offset: u32) -> Location {
        let (line, column) = self.line_column(offset);
        Location::new(line + 1, column)
    }

    /// Offset in UTF-16 code units, the unit V8 reports ranges in.
    pub fn engine_offset(&self, offset: u32) -> u32 {
        if self.utf16_line_starts.is_empty() {
            return offset.min(self.len());
        }
        let (line, column) = self.line_column(offset);
        self.utf16_line_starts[line as usize] + column
    }

    pub fn slice(&self, start: u32, end: u32) -> &'s str {
        let start = self.clamp(start);
        let end = self.clamp(end).max(start);
        &self.text[start..end]
    }
}
