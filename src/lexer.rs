// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};

#[derive(Clone)]
struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

/// A query document together with its precomputed line table.
/// Cheap to clone; equality is pointer identity.
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl cmp::Ord for Source {
    fn cmp(&self, other: &Source) -> cmp::Ordering {
        Rc::as_ptr(&self.src).cmp(&Rc::as_ptr(&other.src))
    }
}

impl cmp::PartialOrd for Source {
    fn partial_cmp(&self, other: &Source) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Rc::as_ptr(&self.src) == Rc::as_ptr(&other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        let max_size = u32::MAX as usize - 2;
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed query document size {max_size}");
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() {
            lines.push((start, contents.len() as u32));
        } else if contents.is_empty() {
            lines.push((0, 0));
        } else {
            let s = (contents.len() - 1) as u32;
            lines.push((s, s));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn new(contents: String) -> Result<Source> {
        Self::from_contents("<query>".to_owned(), contents)
    }

    pub fn file(&self) -> &String {
        &self.src.file
    }

    pub fn contents(&self) -> &String {
        &self.src.contents
    }

    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line as usize > self.src.lines.len() {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = col as usize - 1;

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
	{:<line_num_width$}| {}\n\
	{:<line_num_width$}| {:<col_spaces$}^\n\
	{}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(line, col, "error", msg))
    }
}

/// Line/column pair reported in serialized errors. Both are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.col,
        }
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.line, self.col, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Punct,
    String,
    Int,
    Float,
    Name,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    line: u32,
    col: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn read_name(&mut self) -> Result<Token> {
        let start = self.peek().0;
        let col = self.col;
        loop {
            let ch = self.peek().1;
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.iter.next();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        self.col += (end - start) as u32;
        Ok(Token(
            TokenKind::Name,
            Span {
                source: self.source.clone(),
                line: self.line,
                col,
                start: start as u32,
                end: end as u32,
            },
        ))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
        }
    }

    // IntValue and FloatValue follow the JSON number grammar.
    fn read_number(&mut self) -> Result<Token> {
        let (start, chr) = self.peek();
        let col = self.col;
        let mut is_float = false;
        self.iter.next();

        if chr == '-' {
            if !self.peek().1.is_ascii_digit() {
                return Err(self.source.error(self.line, col, "expected digit after `-`"));
            }
            self.iter.next();
        }

        // Read remaining integer part. A leading 0 must stand alone.
        if chr != '0' {
            self.read_digits();
        }

        // Fraction part; `.` must be followed by at least one digit.
        if self.peek().1 == '.' {
            if !self.peekahead(1).1.is_ascii_digit() {
                return Err(self.source.error(self.line, col, "expected digit after `.`"));
            }
            is_float = true;
            self.iter.next();
            self.read_digits();
        }

        // Exponent part.
        let ch = self.peek().1;
        if ch == 'e' || ch == 'E' {
            is_float = true;
            self.iter.next();
            if matches!(self.peek().1, '+' | '-') {
                self.iter.next();
            }
            if !self.peek().1.is_ascii_digit() {
                return Err(self.source.error(self.line, col, "expected digit in exponent"));
            }
            self.read_digits();
        }

        let end = self.peek().0;
        self.col += (end - start) as u32;

        // A number cannot run directly into a name.
        let ch = self.peek().1;
        if ch == '_' || ch == '.' || ch.is_ascii_alphanumeric() {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }

        Ok(Token(
            if is_float {
                TokenKind::Float
            } else {
                TokenKind::Int
            },
            Span {
                source: self.source.clone(),
                line: self.line,
                col,
                start: start as u32,
                end: end as u32,
            },
        ))
    }

    fn read_string(&mut self) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        self.iter.next();
        self.col += 1;
        let (start, _) = self.peek();
        loop {
            let (offset, ch) = self.peek();
            match ch {
                '"' | '\x00' => {
                    break;
                }
                '\n' => {
                    return Err(self.source.error(line, col, "unterminated string"));
                }
                '\\' => {
                    self.iter.next();
                    let (_, ch) = self.peek();
                    self.iter.next();
                    match ch {
                        '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => (),
                        'u' => {
                            for _i in 0..4 {
                                let (offset, ch) = self.peek();
                                let col = self.col + (offset - start) as u32;
                                if !ch.is_ascii_hexdigit() {
                                    return Err(self.source.error(
                                        line,
                                        col,
                                        "invalid hex escape sequence",
                                    ));
                                }
                                self.iter.next();
                            }
                        }
                        _ => {
                            let col = self.col + (offset - start) as u32;
                            return Err(self.source.error(line, col, "invalid escape sequence"));
                        }
                    }
                }
                _ => {
                    let col = self.col + (offset - start) as u32;
                    if !('\u{0020}'..='\u{10FFFF}').contains(&ch) {
                        return Err(self.source.error(line, col, "invalid character in string"));
                    }
                    self.iter.next();
                }
            }
        }

        if self.peek().1 != '"' {
            return Err(self.source.error(line, col, "unterminated string"));
        }

        self.iter.next();
        let end = self.peek().0;
        self.col += (end - start) as u32 + 1;

        Ok(Token(
            TokenKind::String,
            Span {
                source: self.source.clone(),
                line,
                col,
                start: start as u32,
                end: end as u32 - 1,
            },
        ))
    }

    fn skip_ws(&mut self) -> Result<()> {
        // Commas are insignificant in GraphQL and treated as whitespace,
        // as are comments introduced by `#`.
        'outer: loop {
            match self.peek().1 {
                ' ' | ',' => self.col += 1,
                '\t' => self.col += 4,
                '\r' => {
                    if self.peekahead(1).1 != '\n' {
                        self.col = 1;
                        self.line += 1;
                    }
                }
                '\n' => {
                    self.col = 1;
                    self.line += 1;
                }
                '\u{FEFF}' => (),
                '#' => {
                    self.iter.next();
                    loop {
                        match self.peek().1 {
                            '\n' | '\x00' => continue 'outer,
                            _ => self.iter.next(),
                        };
                    }
                }
                _ => break,
            }
            self.iter.next();
        }
        Ok(())
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();
        let col = self.col;

        match chr {
            '-' => self.read_number(),
            '.' => {
                // The only valid use of `.` is the three-dot spread.
                if self.peekahead(1).1 != '.' || self.peekahead(2).1 != '.' {
                    return Err(self.source.error(self.line, self.col, "expected `...`"));
                }
                self.col += 3;
                self.iter.next();
                self.iter.next();
                self.iter.next();
                Ok(Token(
                    TokenKind::Punct,
                    Span {
                        source: self.source.clone(),
                        line: self.line,
                        col,
                        start: start as u32,
                        end: start as u32 + 3,
                    },
                ))
            }
            '!' | '$' | '(' | ')' | ':' | '=' | '@' | '[' | ']' | '{' | '}' | '|' | '&' => {
                self.col += 1;
                self.iter.next();
                Ok(Token(
                    TokenKind::Punct,
                    Span {
                        source: self.source.clone(),
                        line: self.line,
                        col,
                        start: start as u32,
                        end: start as u32 + 1,
                    },
                ))
            }
            '"' => self.read_string(),
            '\x00' => Ok(Token(
                TokenKind::Eof,
                Span {
                    source: self.source.clone(),
                    line: self.line,
                    col,
                    start: start as u32,
                    end: start as u32,
                },
            )),
            _ if chr.is_ascii_digit() => self.read_number(),
            _ if chr.is_ascii_alphabetic() || chr == '_' => self.read_name(),
            _ => Err(self.source.error(self.line, self.col, "invalid character")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(doc: &str) -> Vec<(TokenKind, String)> {
        let source = Source::new(doc.to_owned()).unwrap();
        let mut lexer = Lexer::new(&source);
        let mut toks = vec![];
        loop {
            let tok = lexer.next_token().unwrap();
            if tok.0 == TokenKind::Eof {
                break;
            }
            toks.push((tok.0, tok.1.text().to_owned()));
        }
        toks
    }

    #[test]
    fn punctuators_and_names() {
        let toks = tokens("{ a, ...frag @x }");
        let texts: Vec<&str> = toks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(texts, vec!["{", "a", "...", "frag", "@", "x", "}"]);
    }

    #[test]
    fn numbers() {
        let toks = tokens("1 -42 0 3.14 -1.5e3");
        assert_eq!(toks[0], (TokenKind::Int, "1".to_owned()));
        assert_eq!(toks[1], (TokenKind::Int, "-42".to_owned()));
        assert_eq!(toks[2], (TokenKind::Int, "0".to_owned()));
        assert_eq!(toks[3], (TokenKind::Float, "3.14".to_owned()));
        assert_eq!(toks[4], (TokenKind::Float, "-1.5e3".to_owned()));
    }

    #[test]
    fn strings_and_comments() {
        let toks = tokens("\"foo\" # trailing comment\n\"with \\\"quote\\\"\"");
        assert_eq!(toks[0], (TokenKind::String, "foo".to_owned()));
        assert_eq!(toks[1], (TokenKind::String, "with \\\"quote\\\"".to_owned()));
    }

    #[test]
    fn tracks_line_and_column() {
        let source = Source::new("{\n  boom\n}".to_owned()).unwrap();
        let mut lexer = Lexer::new(&source);
        lexer.next_token().unwrap();
        let tok = lexer.next_token().unwrap();
        assert_eq!(tok.1.line, 2);
        assert_eq!(tok.1.col, 3);
    }

    #[test]
    fn rejects_bad_input() {
        let source = Source::new("{ a ? }".to_owned()).unwrap();
        let mut lexer = Lexer::new(&source);
        lexer.next_token().unwrap();
        lexer.next_token().unwrap();
        assert!(lexer.next_token().is_err());
    }
}
