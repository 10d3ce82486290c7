//! Minimal reader for the KiCad s-expression dialect

use thiserror::Error;

/// A parsed s-expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    /// Bare token (e.g. `segment`, `F.Cu`, `+3V3`)
    Symbol(String),
    /// Double-quoted string with escapes resolved
    String(String),
    Int(i64),
    Float(f64),
    List(Vec<Sexpr>),
}

impl Sexpr {
    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sym(&self) -> Option<&str> {
        match self {
            Sexpr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Sexpr::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Sexpr::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Sexpr::Float(f) => Some(*f),
            Sexpr::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Head symbol of a list, e.g. `segment` for `(segment ...)`
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_sym()
    }
}

/// Location of a syntax error, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SexprError {
    #[error("input is empty")]
    Empty,
    #[error("unexpected end of input, {depth} list(s) left open")]
    UnexpectedEof { depth: usize },
    #[error("unmatched ')' at {0}")]
    UnmatchedClose(Position),
    #[error("unterminated string starting at {0}")]
    UnterminatedString(Position),
    #[error("unexpected content after the root expression at {0}")]
    TrailingInput(Position),
}

/// Parse a single root expression; only whitespace may follow it
pub fn parse(input: &str) -> Result<Sexpr, SexprError> {
    let mut reader = Reader::new(input);

    reader.skip_whitespace();
    if reader.at_end() {
        return Err(SexprError::Empty);
    }

    let root = reader.read_expr()?;

    reader.skip_whitespace();
    if !reader.at_end() {
        return Err(SexprError::TrailingInput(reader.position(reader.pos)));
    }

    Ok(root)
}

struct Reader<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.bytes.get(self.pos) {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    fn position(&self, offset: usize) -> Position {
        let before = &self.bytes[..offset.min(self.bytes.len())];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        Position {
            line,
            column: self.src[line_start..offset].chars().count() + 1,
        }
    }

    /// Iterative so that deeply nested boards cannot overflow the stack
    fn read_expr(&mut self) -> Result<Sexpr, SexprError> {
        let mut stack: Vec<Vec<Sexpr>> = Vec::new();

        loop {
            self.skip_whitespace();
            let Some(&b) = self.bytes.get(self.pos) else {
                return Err(SexprError::UnexpectedEof { depth: stack.len() });
            };

            let node = match b {
                b'(' => {
                    self.pos += 1;
                    stack.push(Vec::new());
                    continue;
                }
                b')' => {
                    let Some(items) = stack.pop() else {
                        return Err(SexprError::UnmatchedClose(self.position(self.pos)));
                    };
                    self.pos += 1;
                    Sexpr::List(items)
                }
                b'"' => self.read_string()?,
                _ => self.read_atom(),
            };

            match stack.last_mut() {
                Some(parent) => parent.push(node),
                None => return Ok(node),
            }
        }
    }

    fn read_string(&mut self) -> Result<Sexpr, SexprError> {
        let start = self.pos;
        self.pos += 1;

        let mut buf = Vec::new();
        while let Some(&b) = self.bytes.get(self.pos) {
            self.pos += 1;
            match b {
                b'"' => return Ok(Sexpr::String(String::from_utf8_lossy(&buf).into_owned())),
                b'\\' => {
                    let Some(&escaped) = self.bytes.get(self.pos) else {
                        break;
                    };
                    self.pos += 1;
                    buf.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        other => other,
                    });
                }
                _ => buf.push(b),
            }
        }

        Err(SexprError::UnterminatedString(self.position(start)))
    }

    fn read_atom(&mut self) -> Sexpr {
        let start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            if b.is_ascii_whitespace() || matches!(b, b'(' | b')' | b'"') {
                break;
            }
            self.pos += 1;
        }
        classify_atom(&self.src[start..self.pos])
    }
}

fn classify_atom(token: &str) -> Sexpr {
    if looks_numeric(token) {
        if let Ok(i) = token.parse::<i64>() {
            return Sexpr::Int(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            return Sexpr::Float(f);
        }
    }
    Sexpr::Symbol(token.to_string())
}

// Keeps `inf`, `nan` and net names like `+3V3` as symbols
fn looks_numeric(token: &str) -> bool {
    let digits = token.trim_start_matches(['-', '+']);
    let digits = digits.strip_prefix('.').unwrap_or(digits);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segment() {
        let sexpr = parse(
            r#"(segment (start 145.07 92.395) (end 159 92.395) (width 0.3) (layer "F.Cu") (net 8))"#,
        )
        .unwrap();

        assert_eq!(sexpr.head(), Some("segment"));
        let items = sexpr.as_list().unwrap();
        assert_eq!(items.len(), 6);

        let start = items[1].as_list().unwrap();
        assert_eq!(start[1].as_float(), Some(145.07));
        assert_eq!(start[2].as_float(), Some(92.395));

        let end = items[2].as_list().unwrap();
        assert_eq!(end[1], Sexpr::Int(159));
        assert_eq!(end[1].as_float(), Some(159.0));

        assert_eq!(items[4].as_list().unwrap()[1].as_str(), Some("F.Cu"));
        assert_eq!(items[5].as_list().unwrap()[1].as_int(), Some(8));
    }

    #[test]
    fn test_symbols_that_look_like_numbers() {
        let sexpr = parse("(net 2 +3V3 - inf .5 -0.25)").unwrap();
        let items = sexpr.as_list().unwrap();
        assert_eq!(items[2], Sexpr::Symbol("+3V3".into()));
        assert_eq!(items[3], Sexpr::Symbol("-".into()));
        assert_eq!(items[4], Sexpr::Symbol("inf".into()));
        assert_eq!(items[5], Sexpr::Float(0.5));
        assert_eq!(items[6], Sexpr::Float(-0.25));
    }

    #[test]
    fn test_string_escapes() {
        let sexpr = parse(r#"(property "Value" "say \"hi\"\n")"#).unwrap();
        let items = sexpr.as_list().unwrap();
        assert_eq!(items[2].as_str(), Some("say \"hi\"\n"));
    }

    #[test]
    fn test_multiline_input() {
        let sexpr = parse("(kicad_pcb\n\t(version 20241229)\n\t(embedded_fonts no)\n)\n").unwrap();
        assert_eq!(sexpr.head(), Some("kicad_pcb"));
        assert_eq!(sexpr.as_list().unwrap().len(), 3);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("  \n"), Err(SexprError::Empty));
        assert_eq!(
            parse("(kicad_pcb (version 1)"),
            Err(SexprError::UnexpectedEof { depth: 1 })
        );
        assert_eq!(
            parse("(a)\n)"),
            Err(SexprError::TrailingInput(Position { line: 2, column: 1 }))
        );
        assert_eq!(
            parse(")"),
            Err(SexprError::UnmatchedClose(Position { line: 1, column: 1 }))
        );
        assert_eq!(
            parse("(a\n  \"open)"),
            Err(SexprError::UnterminatedString(Position { line: 2, column: 3 }))
        );
    }
}
