use super::parsers::{is_block_comment_end, is_block_comment_start, is_line_comment_start};

/// What a run of SQL text is, from the lexer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    /// Plain SQL where keywords, parentheses and placeholders are meaningful.
    Code,
    /// `'...'` string literal, including any `N` prefix's quote pair.
    Literal,
    /// `"..."` or `[...]` quoted identifier.
    QuotedIdent,
    /// `-- ...` or `/* ... */`.
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub kind: SegmentKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Copy)]
enum State {
    SingleQuoted,
    DoubleQuoted,
    Bracketed,
    LineComment,
    BlockComment(u32),
}

/// Splits T-SQL text into code, literal, quoted-identifier and comment runs.
/// Unterminated quotes or comments extend to the end of the input.
pub(crate) struct Segments<'a> {
    bytes: &'a [u8],
    idx: usize,
}

pub(crate) fn segments(sql: &str) -> Segments<'_> {
    Segments {
        bytes: sql.as_bytes(),
        idx: 0,
    }
}

impl Segments<'_> {
    fn opening_state(&self, idx: usize) -> Option<State> {
        match self.bytes[idx] {
            b'\'' => Some(State::SingleQuoted),
            b'"' => Some(State::DoubleQuoted),
            b'[' => Some(State::Bracketed),
            _ if is_line_comment_start(self.bytes, idx) => Some(State::LineComment),
            _ if is_block_comment_start(self.bytes, idx) => Some(State::BlockComment(1)),
            _ => None,
        }
    }

    /// Returns the index one past the end of the quoted run or comment starting at `start`.
    fn close(&self, start: usize, state: State) -> usize {
        let bytes = self.bytes;
        let mut state = state;
        let mut idx = match state {
            State::LineComment | State::BlockComment(_) => start + 2,
            _ => start + 1,
        };
        while idx < bytes.len() {
            let b = bytes[idx];
            match state {
                State::SingleQuoted | State::DoubleQuoted | State::Bracketed => {
                    let closing = match state {
                        State::SingleQuoted => b'\'',
                        State::DoubleQuoted => b'"',
                        _ => b']',
                    };
                    if b == closing {
                        if bytes.get(idx + 1) == Some(&closing) {
                            idx += 1; // skip escaped quote
                        } else {
                            return idx + 1;
                        }
                    }
                }
                State::LineComment => {
                    if b == b'\n' {
                        return idx;
                    }
                }
                State::BlockComment(depth) => {
                    if is_block_comment_start(bytes, idx) {
                        state = State::BlockComment(depth + 1);
                        idx += 1;
                    } else if is_block_comment_end(bytes, idx) {
                        if depth == 1 {
                            return idx + 2;
                        }
                        state = State::BlockComment(depth - 1);
                        idx += 1;
                    }
                }
            }
            idx += 1;
        }
        bytes.len()
    }
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let start = self.idx;
        if start >= self.bytes.len() {
            return None;
        }

        if let Some(state) = self.opening_state(start) {
            let end = self.close(start, state);
            self.idx = end;
            let kind = match state {
                State::SingleQuoted => SegmentKind::Literal,
                State::DoubleQuoted | State::Bracketed => SegmentKind::QuotedIdent,
                State::LineComment | State::BlockComment(_) => SegmentKind::Comment,
            };
            return Some(Segment { kind, start, end });
        }

        let mut idx = start + 1;
        while idx < self.bytes.len() && self.opening_state(idx).is_none() {
            idx += 1;
        }
        self.idx = idx;
        Some(Segment {
            kind: SegmentKind::Code,
            start,
            end: idx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<(SegmentKind, &str)> {
        segments(sql)
            .map(|s| (s.kind, &sql[s.start..s.end]))
            .collect()
    }

    #[test]
    fn splits_literals_identifiers_and_comments() {
        let sql = "select 'it''s', [a]]b], \"c\" -- tail\nfrom /* x /* y */ */ t";
        assert_eq!(
            kinds(sql),
            vec![
                (SegmentKind::Code, "select "),
                (SegmentKind::Literal, "'it''s'"),
                (SegmentKind::Code, ", "),
                (SegmentKind::QuotedIdent, "[a]]b]"),
                (SegmentKind::Code, ", "),
                (SegmentKind::QuotedIdent, "\"c\""),
                (SegmentKind::Code, " "),
                (SegmentKind::Comment, "-- tail"),
                (SegmentKind::Code, "\nfrom "),
                (SegmentKind::Comment, "/* x /* y */ */"),
                (SegmentKind::Code, " t"),
            ]
        );
    }

    #[test]
    fn unterminated_literal_runs_to_end() {
        assert_eq!(
            kinds("select 'oops"),
            vec![(SegmentKind::Code, "select "), (SegmentKind::Literal, "'oops")]
        );
    }
}
