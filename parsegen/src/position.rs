/// Keep track of a position within a str, updating on successful operations.
#[derive(Debug, Clone, Copy)]
pub struct Position<'a> {
    pub input: &'a str,
    pub idx: usize,
}

impl<'a> Position<'a> {
    /// Create a new cursor, ensuring that `start` is within bounds and on a
    /// char boundary.
    pub fn new(input: &'a str, start: usize) -> Option<Self> {
        if input.is_char_boundary(start) {
            Some(Position { input, idx: start })
        } else {
            None
        }
    }

    /// A cursor at the beginning of `input`.
    pub fn start(input: &'a str) -> Self {
        Position { input, idx: 0 }
    }

    /// The not yet consumed part of the input.
    pub fn rest(&self) -> &'a str {
        &self.input[self.idx..]
    }

    pub fn at_end(&self) -> bool {
        self.idx >= self.input.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Check if a string matches the current input starting at the current
    /// index. The index will be updated on match.
    pub fn match_str(&mut self, s: &str, ignore_case: bool) -> bool {
        let end = self.idx + s.len();
        let matched = match self.input.get(self.idx..end) {
            Some(candidate) if ignore_case => candidate.to_lowercase() == s.to_lowercase(),
            Some(candidate) => candidate == s,
            None => false,
        };
        if matched {
            self.idx = end;
        }
        matched
    }

    /// Move current index forward past every char satisfying `f`.
    pub fn skip_while<F>(&mut self, f: F) -> bool
    where
        F: Fn(char) -> bool,
    {
        let skipped: usize = self
            .rest()
            .chars()
            .take_while(|c| f(*c))
            .map(char::len_utf8)
            .sum();
        self.idx += skipped;
        skipped > 0
    }

    /// 1-based line and column of the current index.
    pub fn line_col(&self) -> (usize, usize) {
        grammar::line_col(self.input, self.idx)
    }
}
