//! implements a parser for job file lines of the form `<priority> <command>`.
use std::fmt;

use crate::types::job::RawJob;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParsingError {
    BadPriority,
    MissingCommand,
    InvalidUtf8,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::BadPriority => "priority is not an integer",
            Self::MissingCommand => "missing command after priority",
            Self::InvalidUtf8 => "command is not valid UTF-8",
        })
    }
}

impl std::error::Error for ParsingError {}

fn is_blank(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

/// Provides a custom, minimal, zero-copy parser of byte slices.
struct ParseState<'a> {
    from: &'a [u8],
}

impl ParseState<'_> {
    /// Consumes an optionally negative decimal integer, ending at a blank or
    /// the end of the input.
    fn expect_next_i64(&mut self) -> Result<i64, ParsingError> {
        let (negative, digits) = match self.from.split_first() {
            Some((b'-', rest)) => (true, rest),
            _ => (false, self.from),
        };

        let len = digits
            .iter()
            .position(|c| is_blank(*c))
            .unwrap_or(digits.len());

        if len == 0 {
            return Err(ParsingError::BadPriority);
        }

        // Accumulate towards the sign so i64::MIN parses without overflow.
        let mut r = 0i64;
        for v in &digits[..len] {
            let d = match v {
                b'0'..=b'9' => (*v - b'0') as i64,
                _ => return Err(ParsingError::BadPriority),
            };
            r = r.checked_mul(10).ok_or(ParsingError::BadPriority)?;
            r = if negative {
                r.checked_sub(d)
            } else {
                r.checked_add(d)
            }
            .ok_or(ParsingError::BadPriority)?;
        }

        self.from = &digits[len..];

        Ok(r)
    }

    /// Consumes one or more spaces or tabs.
    fn expect_blanks(&mut self) -> Result<(), ParsingError> {
        let n = self
            .from
            .iter()
            .position(|c| !is_blank(*c))
            .unwrap_or(self.from.len());

        if n == 0 {
            return Err(ParsingError::MissingCommand);
        }

        self.from = &self.from[n..];
        Ok(())
    }

    /// Consumes the rest of the input as a command, trimming trailing blanks.
    fn expect_rest(&mut self) -> Result<&str, ParsingError> {
        let from = self.from;
        let end = from
            .iter()
            .rposition(|c| !is_blank(*c))
            .map_or(0, |i| i + 1);
        let rest = &from[..end];
        self.from = &[];

        if rest.is_empty() {
            return Err(ParsingError::MissingCommand);
        }

        std::str::from_utf8(rest).map_err(|_| ParsingError::InvalidUtf8)
    }
}

impl<'a> From<&'a [u8]> for ParseState<'a> {
    fn from(from: &'a [u8]) -> Self {
        ParseState { from }
    }
}

/// Returns true for lines that carry no job: empty, blank, or comments.
pub fn is_ignorable(line: &[u8]) -> bool {
    match line.iter().find(|c| !is_blank(**c)) {
        None => true,
        Some(c) => *c == b'#',
    }
}

// The priority is split from the command at the first run of blanks only; the
// command keeps any inner whitespace verbatim.
impl TryFrom<&[u8]> for RawJob {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let mut ps: ParseState = value.into();

        let priority = ps.expect_next_i64()?;
        ps.expect_blanks()?;
        let command = ps.expect_rest()?;

        Ok(RawJob::new(priority, command))
    }
}
