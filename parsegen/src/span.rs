use crate::position::Position;

/// A region over a string.
#[derive(Debug, Clone, Copy)]
pub struct Span<'a> {
    pub s: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Span<'a> {
    /// Span between two positions over the same input. A start past the end
    /// yields an empty span at `start`.
    pub fn from_positions(start: &Position<'a>, end: &Position<'a>) -> Self {
        debug_assert!(std::ptr::eq(start.input, end.input));
        Self {
            s: start.input,
            start: start.idx,
            end: end.idx.max(start.idx),
        }
    }

    pub fn as_str(&self) -> &'a str {
        &self.s[self.start..self.end]
    }

    /// 1-based line and column of the span start.
    pub fn line_col(&self) -> (usize, usize) {
        grammar::line_col(self.s, self.start)
    }
}

impl<'a> PartialEq for Span<'a> {
    fn eq(&self, other: &Span<'a>) -> bool {
        self.start == other.start && self.end == other.end && self.as_str() == other.as_str()
    }
}
