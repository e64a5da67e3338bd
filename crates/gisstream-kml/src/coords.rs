//! Lenient parser for KML `coordinates` text
//!
//! Tuples are `lon,lat[,alt]` separated by whitespace. Producers get this
//! wrong in every way imaginable (spaces after commas, commas between
//! tuples, stray words), so the scan is a small state machine over numeric
//! tokens rather than a split on whitespace.

use gisstream_core::Coord;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_IN_TUPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s+\.?\d").expect("Invalid whitespace-in-tuple regex"));

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Comma,
    Word(String),
    Other(char),
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    const fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_digits(&mut self) -> usize {
        let mut n = 0;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            n += 1;
        }
        n
    }

    /// Sign, digits, optional fraction, optional exponent. Returns `None`
    /// (consuming nothing) when no digit follows.
    fn number(&mut self) -> Option<f64> {
        let start = self.pos;
        if matches!(self.peek_char(), Some('+' | '-')) {
            self.pos += 1;
        }
        let mut digits = self.eat_digits();
        if self.peek_char() == Some('.') {
            self.pos += 1;
            digits += self.eat_digits();
        }
        if digits == 0 {
            self.pos = start;
            return None;
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.pos += 1;
            }
            if self.eat_digits() == 0 {
                self.pos = mark;
            }
        }
        self.text[start..self.pos].parse().ok()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.bump();
        }
        let c = self.peek_char()?;
        if c == ',' {
            self.pos += 1;
            return Some(Token::Comma);
        }
        if c.is_ascii_digit() || matches!(c, '+' | '-' | '.') {
            if let Some(v) = self.number() {
                return Some(Token::Number(v));
            }
        }
        if c.is_alphabetic() {
            let start = self.pos;
            while self
                .peek_char()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
            {
                self.bump();
            }
            return Some(Token::Word(self.text[start..self.pos].to_string()));
        }
        self.bump();
        Some(Token::Other(c))
    }
}

#[derive(Default)]
struct TupleBuilder {
    out: Vec<Coord>,
    lon: f64,
    lat: f64,
    alt: f64,
    parts: u8,
    /// Whether the tuple in progress received at least one number
    has_value: bool,
}

impl TupleBuilder {
    fn emit(&mut self, parts: u8) {
        if self.has_value {
            let alt = (parts == 3).then_some(self.alt);
            let lat = if parts >= 2 { self.lat } else { 0.0 };
            match Coord::new(self.lon, lat, alt) {
                Ok(coord) => self.out.push(coord),
                Err(e) => log::warn!("Skipping coordinate tuple: {e}"),
            }
        }
        self.has_value = false;
    }
}

/// Parse a `coordinates` string into positions.
///
/// Never fails: unparsable input yields an empty list. Stray words and
/// symbols are dropped with a warning; a tuple whose latitude is out of
/// range is dropped alone. `"1,2,3 4,5,6"`, `"1, 2, 3   4, 5, 6"` and
/// `"1,2,3,4,5,6"` all give the same two positions.
///
/// # Example
///
/// ```
/// use gisstream_kml::parse_coordinates;
///
/// let coords = parse_coordinates("-122.08,37.42,0 -122.09,37.43");
/// assert_eq!(coords.len(), 2);
/// assert_eq!(coords[1].alt, None);
/// ```
#[must_use]
pub fn parse_coordinates(text: &str) -> Vec<Coord> {
    if log::log_enabled!(log::Level::Debug) && WHITESPACE_IN_TUPLE.is_match(text) {
        log::debug!("Whitespace found within coordinate tuple");
    }

    let mut b = TupleBuilder::default();
    let mut seen_comma = false;

    for token in Lexer::new(text) {
        match token {
            Token::Number(v) => {
                if b.parts == 3 {
                    if seen_comma {
                        log::debug!("Comma used instead of whitespace between coordinate tuples");
                        seen_comma = false;
                    }
                    b.emit(3);
                    b.parts = 0;
                }
                b.parts += 1;
                b.has_value = true;
                match b.parts {
                    1 => {
                        if seen_comma {
                            b.lon = 0.0;
                            b.lat = v;
                            b.parts = 2;
                        } else {
                            b.lon = v;
                        }
                    }
                    2 => {
                        if seen_comma {
                            b.lat = v;
                        } else {
                            // whitespace after a lone value closes a 1D tuple
                            b.emit(1);
                            b.has_value = true;
                            b.lon = v;
                            b.parts = 1;
                        }
                    }
                    _ => {
                        if seen_comma {
                            b.alt = v;
                        } else {
                            b.emit(2);
                            b.has_value = true;
                            b.lon = v;
                            b.parts = 1;
                        }
                    }
                }
                seen_comma = false;
            }
            Token::Comma => {
                if !seen_comma {
                    seen_comma = true;
                    if b.parts == 0 {
                        b.lon = 0.0;
                        b.parts = 1;
                    }
                } else if b.parts == 1 {
                    b.lat = 0.0;
                    b.parts = 2;
                } else if b.parts == 0 {
                    b.lon = 0.0;
                    b.parts = 1;
                }
            }
            Token::Word(word) => log::warn!("Ignoring invalid word in coordinates: {word}"),
            Token::Other(c) => log::warn!("Ignoring invalid character in coordinates: {c:?}"),
        }
    }

    match b.parts {
        1 => b.emit(1),
        2 => b.emit(2),
        3 => b.emit(3),
        _ => {}
    }
    b.out
}
