// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;
use std::rc::Rc;

use anyhow::{bail, Result};
use serde::Serialize;

#[derive(Clone)]
struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

/// A document's text along with a table of line boundaries.
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        let max_size = u32::MAX as usize - 2; // Account for rows, cols possibly starting at 1, EOF etc.
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed document size {max_size}");
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

        if (start as usize) < contents.len() || contents.is_empty() {
            lines.push((start, contents.len() as u32));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Source> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => bail!("Failed to read {}. {e}", path.as_ref().display()),
        };
        Self::from_contents(path.as_ref().to_string_lossy().to_string(), contents)
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

    /// 1-based line and column of a byte offset.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset as u32;
        let idx = match self
            .src
            .lines
            .binary_search_by(|(start, _)| start.cmp(&offset))
        {
            Ok(idx) => idx,
            Err(0) => 0,
            Err(idx) => idx - 1,
        };
        let start = self.src.lines.get(idx).map(|l| l.0).unwrap_or(0);
        (idx as u32 + 1, offset.saturating_sub(start) + 1)
    }

    pub fn line_of(&self, offset: usize) -> u32 {
        self.position(offset).0
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line == 0 || line as usize > self.src.lines.len() {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = col.max(1) as usize - 1;

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
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum RegionKind {
    Expression,
    Control,
    Comment,
    Literal,
}

impl RegionKind {
    fn from_opener(ch: u8) -> Option<(RegionKind, &'static str)> {
        match ch {
            b'{' => Some((RegionKind::Expression, "}}")),
            b'%' => Some((RegionKind::Control, "%}")),
            b'#' => Some((RegionKind::Comment, "#}")),
            _ => None,
        }
    }
}

/// A contiguous span of a string. Regions produced by [`scan`] never overlap
/// and literal regions fill the gaps between delimited ones.
#[derive(Clone, PartialEq, Eq)]
pub struct Region<'a> {
    pub kind: RegionKind,
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
    // False when the closing delimiter was never found.
    pub closed: bool,
}

impl Debug for Region<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_fmt(format_args!(
            "{:?}:{}:{}:{:?}",
            self.kind, self.start, self.end, self.text
        ))
    }
}

impl<'a> Region<'a> {
    /// Text between the delimiters, without whitespace-control markers, and
    /// the absolute offset at which it starts.
    pub fn inner(&self) -> (usize, &'a str) {
        if self.kind == RegionKind::Literal {
            return (self.start, self.text);
        }
        let bytes = self.text.as_bytes();
        let mut begin = 2.min(bytes.len());
        if matches!(bytes.get(begin), Some(b'-' | b'+')) {
            begin += 1;
        }
        let mut finish = bytes.len();
        if self.closed {
            finish = finish.saturating_sub(2).max(begin);
            if finish > begin && matches!(bytes.get(finish - 1), Some(b'-' | b'+')) {
                finish -= 1;
            }
        }
        (self.start + begin, &self.text[begin..finish])
    }

    pub fn is_code(&self) -> bool {
        matches!(self.kind, RegionKind::Expression | RegionKind::Control)
    }

    pub fn tokens(&self) -> Vec<Token<'a>> {
        if !self.is_code() {
            return vec![];
        }
        let (offset, text) = self.inner();
        tokenize(text, offset)
    }
}

/// Splits a string into template regions.
#[derive(Clone)]
pub struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

pub fn scan(text: &str) -> Scanner<'_> {
    Scanner { text, pos: 0 }
}

impl<'a> Scanner<'a> {
    fn find_opener(&self, from: usize) -> Option<usize> {
        let bytes = self.text.as_bytes();
        let mut i = from;
        while i + 1 < bytes.len() {
            if bytes[i] == b'{' && matches!(bytes[i + 1], b'{' | b'%' | b'#') {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    fn read_region(&mut self, start: usize, kind: RegionKind, closer: &str) -> Region<'a> {
        let bytes = self.text.as_bytes();
        let closer = closer.as_bytes();
        let mut quote: Option<u8> = None;
        let mut i = start + 2;
        while i < bytes.len() {
            let ch = bytes[i];
            match quote {
                Some(_) if ch == b'\\' => {
                    // Skip the escaped character, stay inside the literal.
                    i += 2;
                    continue;
                }
                Some(q) if ch == q => quote = None,
                Some(_) => {}
                None if kind != RegionKind::Comment && (ch == b'\'' || ch == b'"') => {
                    quote = Some(ch)
                }
                None if ch == closer[0] && bytes.get(i + 1) == Some(&closer[1]) => {
                    self.pos = i + 2;
                    return Region {
                        kind,
                        start,
                        end: self.pos,
                        text: &self.text[start..self.pos],
                        closed: true,
                    };
                }
                None => {}
            }
            i += 1;
        }

        self.pos = self.text.len();
        Region {
            kind,
            start,
            end: self.pos,
            text: &self.text[start..],
            closed: false,
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Region<'a>;

    fn next(&mut self) -> Option<Region<'a>> {
        if self.pos >= self.text.len() {
            return None;
        }
        let start = self.pos;
        match self.find_opener(start) {
            Some(open) if open == start => {
                let (kind, closer) =
                    RegionKind::from_opener(self.text.as_bytes()[start + 1])?;
                Some(self.read_region(start, kind, closer))
            }
            found => {
                let end = found.unwrap_or(self.text.len());
                self.pos = end;
                Some(Region {
                    kind: RegionKind::Literal,
                    start,
                    end,
                    text: &self.text[start..end],
                    closed: true,
                })
            }
        }
    }
}

/// True if the text contains an expression or control opener.
pub fn is_templated(text: &str) -> bool {
    scan(text).any(|r| r.is_code())
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
pub enum TokenKind {
    Ident,
    String,
    Number,
    Operator,
    Pipe,
    Punct,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: usize,
}

impl Debug for Token<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_fmt(format_args!("{:?}:{}:{:?}", self.kind, self.offset, self.text))
    }
}

impl<'a> Token<'a> {
    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    pub fn number(&self) -> Option<f64> {
        match self.kind {
            TokenKind::Number => self.text.parse().ok(),
            _ => None,
        }
    }

    /// Contents of a string literal without its quotes.
    pub fn unquoted(&self) -> &'a str {
        let t = self.text;
        if self.kind != TokenKind::String || t.is_empty() {
            return t;
        }
        let q = &t[0..1];
        match t.len() > 1 && t.ends_with(q) {
            true => &t[1..t.len() - 1],
            false => &t[1..],
        }
    }
}

#[derive(Clone)]
pub struct Lexer<'a> {
    text: &'a str,
    base: usize,
    iter: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str, base: usize) -> Self {
        Self {
            text,
            base,
            iter: text.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.text.len(), '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.text.len(), '\x00'),
        }
    }

    fn token(&mut self, kind: TokenKind, start: usize) -> Token<'a> {
        let end = self.peek().0;
        Token {
            kind,
            text: &self.text[start..end],
            offset: self.base + start,
        }
    }

    fn read_ident(&mut self) -> Token<'a> {
        let start = self.peek().0;
        while matches!(self.peek().1, c if c.is_alphanumeric() || c == '_') {
            self.iter.next();
        }
        self.token(TokenKind::Ident, start)
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
        }
    }

    fn read_number(&mut self) -> Token<'a> {
        let start = self.peek().0;
        self.read_digits();

        // . must be followed by at least 1 digit, otherwise it is attribute access.
        if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
            self.iter.next();
            self.read_digits();
        }

        if matches!(self.peek().1, 'e' | 'E')
            && (self.peekahead(1).1.is_ascii_digit()
                || (matches!(self.peekahead(1).1, '+' | '-')
                    && self.peekahead(2).1.is_ascii_digit()))
        {
            self.iter.next();
            if matches!(self.peek().1, '+' | '-') {
                self.iter.next();
            }
            self.read_digits();
        }
        self.token(TokenKind::Number, start)
    }

    // Unterminated strings run to the end of the region.
    fn read_string(&mut self) -> Token<'a> {
        let (start, quote) = self.peek();
        self.iter.next();
        loop {
            match self.peek().1 {
                '\x00' if self.peek().0 >= self.text.len() => break,
                '\\' => {
                    self.iter.next();
                    self.iter.next();
                }
                ch if ch == quote => {
                    self.iter.next();
                    break;
                }
                _ => {
                    self.iter.next();
                }
            }
        }
        self.token(TokenKind::String, start)
    }

    fn read_operator(&mut self) -> Token<'a> {
        let (start, ch) = self.peek();
        let next = self.peekahead(1).1;
        self.iter.next();
        let double = matches!(
            (ch, next),
            ('*', '*') | ('/', '/') | ('=', '=') | ('!', '=') | ('<', '=') | ('>', '=')
        );
        if double {
            self.iter.next();
        }
        self.token(TokenKind::Operator, start)
    }

    pub fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            let (start, chr) = self.peek();
            if start >= self.text.len() {
                return None;
            }
            return Some(match chr {
                c if c.is_whitespace() => {
                    self.iter.next();
                    continue;
                }
                '\'' | '"' => self.read_string(),
                c if c.is_ascii_digit() => self.read_number(),
                c if c.is_alphabetic() || c == '_' => self.read_ident(),
                '|' => {
                    self.iter.next();
                    self.token(TokenKind::Pipe, start)
                }
                '(' | ')' | '[' | ']' | '{' | '}' | ',' | '.' | ':' => {
                    self.iter.next();
                    self.token(TokenKind::Punct, start)
                }
                '+' | '-' | '*' | '/' | '%' | '~' | '<' | '>' | '=' => self.read_operator(),
                '!' if self.peekahead(1).1 == '=' => self.read_operator(),
                _ => {
                    // Characters with no meaning in expressions are skipped.
                    self.iter.next();
                    continue;
                }
            });
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.next_token()
    }
}

/// Tokenize `text`, reporting offsets relative to `base`.
pub fn tokenize(text: &str, base: usize) -> Vec<Token<'_>> {
    Lexer::new(text, base).collect()
}

/// An expression or control region along with its tokens.
#[derive(Debug, Clone)]
pub struct Fragment<'a> {
    pub region: Region<'a>,
    pub tokens: Vec<Token<'a>>,
}

impl Fragment<'_> {
    pub fn is_control(&self) -> bool {
        self.region.kind == RegionKind::Control
    }
}

pub fn fragments(text: &str) -> Vec<Fragment<'_>> {
    scan(text)
        .filter(|r| r.is_code())
        .map(|region| Fragment {
            tokens: region.tokens(),
            region,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<RegionKind> {
        scan(text).map(|r| r.kind).collect()
    }

    #[test]
    fn regions_cover_text() {
        let text = "a {{ b }} c {% if d %}e{% endif %}{# f #}";
        let regions: Vec<_> = scan(text).collect();
        let mut pos = 0;
        for r in &regions {
            assert_eq!(r.start, pos);
            pos = r.end;
        }
        assert_eq!(pos, text.len());
        assert_eq!(
            kinds(text),
            vec![
                RegionKind::Literal,
                RegionKind::Expression,
                RegionKind::Literal,
                RegionKind::Control,
                RegionKind::Literal,
                RegionKind::Control,
                RegionKind::Comment,
            ]
        );
    }

    #[test]
    fn closer_inside_string_literal() {
        let text = "{{ 'a }} b' ~ x }}";
        let regions: Vec<_> = scan(text).collect();
        assert_eq!(regions.len(), 1);
        assert!(regions[0].closed);
        let tokens = regions[0].tokens();
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].unquoted(), "a }} b");
        assert!(tokens[2].is_ident("x"));
    }

    #[test]
    fn other_quote_is_inert() {
        let tokens = tokenize("\"it's\" ~ y", 0);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].text, "\"it's\"");
    }

    #[test]
    fn unterminated_region() {
        let regions: Vec<_> = scan("x {{ y").collect();
        assert_eq!(regions.len(), 2);
        assert!(!regions[1].closed);
        assert_eq!(regions[1].inner().1, " y");
    }

    #[test]
    fn whitespace_control_markers() {
        let region = scan("{%- set x = 1 -%}").next().unwrap();
        assert_eq!(region.inner(), (3, " set x = 1 "));
    }

    #[test]
    fn operators_and_numbers() {
        let tokens = tokenize("a // 2.5 ** b != 1e3 | round(1)", 10);
        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(
            texts,
            vec!["a", "//", "2.5", "**", "b", "!=", "1e3", "|", "round", "(", "1", ")"]
        );
        assert_eq!(tokens[0].offset, 10);
        assert_eq!(tokens[2].number(), Some(2.5));
    }

    #[test]
    fn source_positions() {
        let source =
            Source::from_contents("a.yaml".to_string(), "ab\ncd\r\nef".to_string()).unwrap();
        assert_eq!(source.position(0), (1, 1));
        assert_eq!(source.position(4), (2, 2));
        assert_eq!(source.line_of(8), 3);
        assert_eq!(source.line(1), "cd");
        assert_eq!(source.line(2), "ef");
        assert_eq!(source.line(3), "");

        let msg = source.message(2, 2, "error", "bad token");
        assert!(msg.starts_with("\n--> a.yaml:2:2\n"), "{msg}");
        assert!(msg.contains("| cd\n"), "{msg}");
        assert!(msg.ends_with("error: bad token"), "{msg}");
        assert_eq!(source.message(4, 1, "error", "x"), "a.yaml: invalid line 4 specified");
    }
}
