use serde::Serialize;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

/// A span of source text, 1-based line/column like editors show them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SourceRange {
    pub filename: String,
    pub start: Pos,
    pub end: Pos,
}

impl SourceRange {
    pub fn new(filename: impl Into<String>, start: Pos, end: Pos) -> Self {
        Self {
            filename: filename.into(),
            start,
            end,
        }
    }

    /// Zero-width range at the first byte of `filename`.
    pub fn file_start(filename: impl Into<String>) -> Self {
        let start = Pos {
            line: 1,
            column: 1,
            byte: 0,
        };
        Self::new(filename, start, start)
    }

    /// Smallest range covering both `self` and `other`.
    pub fn to(&self, other: &SourceRange) -> SourceRange {
        let start = self.start.min(other.start);
        let end = self.end.max(other.end);
        SourceRange::new(self.filename.clone(), start, end)
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{},{}-{}",
                self.filename, self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(
                f,
                "{}:{},{}-{},{}",
                self.filename, self.start.line, self.start.column, self.end.line, self.end.column
            )
        }
    }
}

/// Maps byte offsets of one source file to line/column positions.
pub struct LineIndex<'a> {
    filename: &'a str,
    src: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(filename: &'a str, src: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            filename,
            src,
            line_starts,
        }
    }

    pub fn filename(&self) -> &str {
        self.filename
    }

    pub fn pos(&self, byte: usize) -> Pos {
        let byte = byte.min(self.src.len());
        let line = match self.line_starts.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .src
            .get(line_start..byte)
            .map(|s| s.chars().count())
            .unwrap_or(byte - line_start)
            + 1;
        Pos {
            line: line + 1,
            column,
            byte,
        }
    }

    pub fn range(&self, span: Range<usize>) -> SourceRange {
        SourceRange::new(self.filename, self.pos(span.start), self.pos(span.end))
    }

    pub fn range_opt(&self, span: Option<Range<usize>>) -> SourceRange {
        match span {
            Some(span) => self.range(span),
            None => SourceRange::file_start(self.filename),
        }
    }

    /// Zero-width range at the end of the file.
    pub fn end_of_file(&self) -> SourceRange {
        let end = self.pos(self.src.len());
        SourceRange::new(self.filename, end, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let src = "a = 1\nbé = 2\n";
        let idx = LineIndex::new("main.tf", src);
        let p = idx.pos(6);
        assert_eq!((p.line, p.column), (2, 1));
        // "é" is two bytes but one column
        let p = idx.pos(9);
        assert_eq!((p.line, p.column), (2, 3));
    }

    #[test]
    fn renders_like_hcl() {
        let idx = LineIndex::new("main.tf", "foo = bar\n");
        assert_eq!(idx.range(6..9).to_string(), "main.tf:1,7-10");
    }
}
