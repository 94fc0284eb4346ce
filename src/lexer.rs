//! Lexical analysis: character stream → token sequence (spec §4.1).
//!
//! Grounded on the teacher's `Peekable<Chars>` scanner (`src/lexer/mod.rs`):
//! a hand-rolled longest-match scanner driven by character class, with a
//! reserved-word table consulted once an identifier-shaped run has been
//! read. `once_cell::sync::Lazy` replaces the teacher's `lazy_static!` for
//! the same "static lookup table built once" idiom.

use std::{error::Error, fmt::Display, iter::Peekable, str::Chars};

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;

use crate::limits::in_int_range;
use crate::token::{Position, Token};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.position)
    }
}

impl Error for LexError {}

/// Input ended in the middle of a string literal or a block comment. The
/// host may concatenate more input and retry (spec §7).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncompleteError {
    pub message: String,
}

impl Display for IncompleteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for IncompleteError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LexFailure {
    Lex(LexError),
    Incomplete(IncompleteError),
}

impl Display for LexFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexFailure::Lex(e) => e.fmt(f),
            LexFailure::Incomplete(e) => e.fmt(f),
        }
    }
}

impl Error for LexFailure {}

pub type LexResult<T> = Result<T, LexFailure>;

/// Lexer options relevant to tokenization (the rest of `InterpretOptions`
/// only affects later phases).
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerOptions {
    pub allow_unicode: bool,
}

static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abstype", "and", "andalso", "as", "case", "datatype", "do", "else", "end", "exception",
        "fn", "fun", "handle", "if", "in", "infix", "infixr", "let", "local", "nonfix", "of",
        "op", "open", "orelse", "raise", "rec", "then", "type", "val", "while", "with",
        "withtype",
    ]
    .into_iter()
    .collect()
});

static RESERVED_SYMBOLS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [":", ":>", "=>", "->", "|", "#"].into_iter().collect()
});

fn is_alphanumeric_class(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '\'' || c == '_'
}

fn is_symbolic_class(c: char) -> bool {
    matches!(
        c,
        '!' | '%' | '&' | '$' | '#' | '+' | '-' | '/' | ':' | '<' | '=' | '>' | '?' | '@' | '\\'
            | '~' | '`' | '^' | '|' | '*'
    )
}

fn is_sml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0c')
}

pub struct Lexer<'a> {
    iterator: Peekable<Chars<'a>>,
    offset: Position,
    tokens: Vec<Token>,
    options: LexerOptions,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, options: LexerOptions) -> Self {
        Self {
            iterator: source.chars().peekable(),
            offset: 0,
            tokens: vec![],
            options,
        }
    }

    pub fn lex(source: &str, options: LexerOptions) -> LexResult<Vec<Token>> {
        let mut lexer = Lexer::new(source, options);
        lexer.run()?;
        log::debug!("lexed {} tokens", lexer.tokens.len());
        Ok(lexer.tokens)
    }

    fn peek(&mut self) -> Option<char> {
        self.iterator.peek().copied()
    }

    fn peek2(&self) -> Option<char> {
        let mut clone = self.iterator.clone();
        clone.next();
        clone.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.iterator.next();
        if c.is_some() {
            self.offset += 1;
        }
        c
    }

    fn bump_if(&mut self, pred: impl Fn(char) -> bool) -> Option<char> {
        if self.peek().is_some_and(&pred) {
            self.bump()
        } else {
            None
        }
    }

    fn run(&mut self) -> LexResult<()> {
        loop {
            self.eat_whitespace_and_comments()?;
            let Some(next) = self.peek() else {
                return Ok(());
            };

            match next {
                '"' => self.lex_string()?,
                '#' if self.peek2() == Some('"') => self.lex_character()?,
                '~' if self.peek2().is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_numeric(true)?
                }
                c if c.is_ascii_digit() => self.lex_numeric(false)?,
                c if c.is_alphabetic() || c == '_' => self.lex_alphanumeric()?,
                '\'' => self.lex_alphanumeric()?,
                '(' if self.peek2() == Some('*') => self.skip_block_comment()?,
                '(' | ')' | '[' | ']' | '{' | '}' | ',' | ';' => self.lex_punctuation()?,
                '.' => self.lex_dot_or_ellipsis()?,
                c if is_symbolic_class(c) => self.lex_special()?,
                other => {
                    return Err(LexFailure::Lex(LexError {
                        message: format!("unexpected character '{other}'"),
                        position: self.offset,
                    }))
                }
            }
        }
    }

    fn eat_whitespace_and_comments(&mut self) -> LexResult<()> {
        loop {
            while self.bump_if(is_sml_whitespace).is_some() {}
            if self.peek() == Some('(') && self.peek2() == Some('*') {
                self.skip_block_comment()?;
                continue;
            }
            break;
        }
        Ok(())
    }

    fn skip_block_comment(&mut self) -> LexResult<()> {
        let start = self.offset;
        self.bump();
        self.bump();
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek() {
                None => {
                    return Err(LexFailure::Incomplete(IncompleteError {
                        message: "unterminated comment".to_string(),
                    }))
                }
                Some('(') if self.peek2() == Some('*') => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                Some('*') if self.peek2() == Some(')') => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        let _ = start;
        Ok(())
    }

    fn lex_punctuation(&mut self) -> LexResult<()> {
        let position = self.offset;
        let c = self.bump().expect("checked by caller");
        self.tokens.push(Token::Keyword {
            text: c.to_string(),
            position,
        });
        Ok(())
    }

    fn lex_dot_or_ellipsis(&mut self) -> LexResult<()> {
        let position = self.offset;
        self.bump();
        if self.peek() == Some('.') && self.peek2() == Some('.') {
            self.bump();
            self.bump();
            self.tokens.push(Token::Keyword {
                text: "...".to_string(),
                position,
            });
            Ok(())
        } else {
            Err(LexFailure::Lex(LexError {
                message: "stray '.' outside a long identifier or real literal".to_string(),
                position,
            }))
        }
    }

    fn push_identifier_like(&mut self, text: String, symbolic: bool, position: Position) {
        let mut op_prefixed = false;
        if let Some(Token::Keyword { text: last, .. }) = self.tokens.last() {
            if last == "op" {
                op_prefixed = true;
                self.tokens.pop();
            }
        }
        let token = if symbolic {
            Token::SymbolicIdentifier {
                text,
                op_prefixed,
                position,
            }
        } else {
            Token::AlphanumericIdentifier {
                text,
                op_prefixed,
                position,
            }
        };
        self.tokens.push(token);
    }

    /// Scans one maximal run of the alphanumeric class, then either emits a
    /// keyword/type-variable/identifier token, or if immediately followed
    /// (no whitespace) by `.` and another identifier start, folds the run
    /// into a long identifier (spec §4.1 "Long identifiers").
    fn lex_alphanumeric(&mut self) -> LexResult<()> {
        let position = self.offset;
        let first = self.scan_alnum_run();

        if first.starts_with("''") {
            if first.len() < 3 {
                return Err(LexFailure::Lex(LexError {
                    message: "empty equality type variable name".to_string(),
                    position,
                }));
            }
            self.tokens.push(Token::EqualityTypeVariable {
                text: first,
                position,
            });
            return Ok(());
        }
        if let Some(rest) = first.strip_prefix('\'') {
            if rest.is_empty() {
                return Err(LexFailure::Lex(LexError {
                    message: "type variable name must have length >= 2".to_string(),
                    position,
                }));
            }
            self.tokens.push(Token::TypeVariable {
                text: first,
                position,
            });
            return Ok(());
        }

        if RESERVED_WORDS.contains(first.as_str()) {
            self.tokens.push(Token::Keyword {
                text: first,
                position,
            });
            return Ok(());
        }

        // Possible long identifier: `first` is a plain alphanumeric
        // identifier; fold in `.`-separated qualifiers with no
        // intervening whitespace.
        let mut qualifiers = vec![];
        let mut current = first;
        loop {
            if self.peek() == Some('.') {
                let mut after_dot = self.iterator.clone();
                after_dot.next();
                let next_starts_id = after_dot
                    .peek()
                    .is_some_and(|c| c.is_alphabetic() || *c == '_' || is_symbolic_class(*c));
                let is_ellipsis = after_dot.peek() == Some(&'.');
                if next_starts_id && !is_ellipsis {
                    self.bump();
                    qualifiers.push(current);
                    if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
                        current = self.scan_alnum_run();
                        continue;
                    } else {
                        let seg_pos = self.offset;
                        let seg = self.scan_symbolic_run();
                        if seg == "=" {
                            return Err(LexFailure::Lex(LexError {
                                message: "'=' is not a valid long identifier component"
                                    .to_string(),
                                position: seg_pos,
                            }));
                        }
                        self.tokens.push(Token::LongIdentifier {
                            qualifiers,
                            final_text: seg,
                            final_is_symbolic: true,
                            position,
                        });
                        return Ok(());
                    }
                }
            }
            break;
        }

        if qualifiers.is_empty() {
            self.push_identifier_like(current, false, position);
        } else {
            self.tokens.push(Token::LongIdentifier {
                qualifiers,
                final_text: current,
                final_is_symbolic: false,
                position,
            });
        }
        Ok(())
    }

    fn scan_alnum_run(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump_if(is_alphanumeric_class) {
            out.push(c);
        }
        out
    }

    fn scan_symbolic_run(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump_if(is_symbolic_class) {
            out.push(c);
        }
        out
    }

    fn lex_special(&mut self) -> LexResult<()> {
        let position = self.offset;
        let text = self.scan_symbolic_run();

        if text == "*" {
            self.tokens.push(Token::Star { position });
            return Ok(());
        }
        if text == "=" {
            self.tokens.push(Token::Equals { position });
            return Ok(());
        }
        if RESERVED_SYMBOLS.contains(text.as_str()) {
            self.tokens.push(Token::Keyword { text, position });
            return Ok(());
        }
        self.push_identifier_like(text, true, position);
        Ok(())
    }

    fn lex_numeric(&mut self, negative: bool) -> LexResult<()> {
        let position = self.offset;
        let mut text = String::new();
        if negative {
            text.push('~');
            self.bump();
        }

        let int_part = self.scan_digits();
        text.push_str(&int_part);

        if int_part == "0" {
            if self.peek() == Some('x') && self.peek2().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
                let hex = self.scan_hex_digits();
                let mut full = text.clone();
                full.push('x');
                full.push_str(&hex);
                return self.emit_hex_int(full, negative, &hex, position);
            }
            if self.peek() == Some('w') {
                let mut lookahead = self.iterator.clone();
                lookahead.next();
                if lookahead.peek() == Some(&'x') {
                    let mut lookahead2 = lookahead.clone();
                    lookahead2.next();
                    if lookahead2.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                        self.bump();
                        self.bump();
                        let hex = self.scan_hex_digits();
                        return self.emit_word(format!("0wx{hex}"), &hex, true, position);
                    }
                } else if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                    let dec = self.scan_digits();
                    return self.emit_word(format!("0w{dec}"), &dec, false, position);
                }
            }
        }

        // real number: `.` digits, optional exponent
        let mut is_real = false;
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_real = true;
            text.push('.');
            self.bump();
            let frac = self.scan_digits();
            text.push_str(&frac);
        } else if self.peek() == Some('.') {
            return Err(LexFailure::Lex(LexError {
                message: "real literal is missing mantissa digits after '.'".to_string(),
                position,
            }));
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.iterator.clone();
            lookahead.next();
            let mut has_sign = false;
            if lookahead.peek() == Some(&'~') {
                has_sign = true;
                lookahead.next();
            }
            if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_real = true;
                text.push(self.bump().unwrap());
                if has_sign {
                    text.push(self.bump().unwrap());
                }
                let exp = self.scan_digits();
                text.push_str(&exp);
            } else if matches!(self.peek(), Some('e') | Some('E')) {
                // only an error if we already committed to a real via '.':
                // a bare trailing `e` with no digits after is just the
                // start of the next token (e.g. `1e` -> `1` then ident `e`).
            }
        }

        if is_real {
            let parsed: f64 = text.parse().map_err(|_| {
                LexFailure::Lex(LexError {
                    message: format!("invalid real literal '{text}'"),
                    position,
                })
            })?;
            self.tokens.push(Token::RealConstant {
                text,
                value: parsed,
                position,
            });
            return Ok(());
        }

        let magnitude: i64 = int_part.parse().map_err(|_| {
            LexFailure::Lex(LexError {
                message: format!("invalid integer literal '{int_part}'"),
                position,
            })
        })?;
        let value = if negative { -magnitude } else { magnitude };
        if !in_int_range(value) {
            return Err(LexFailure::Lex(LexError {
                message: format!("integer literal '{text}' overflows the int range"),
                position,
            }));
        }
        let has_leading_zero = int_part.len() > 1 && int_part.starts_with('0');
        if !negative && !has_leading_zero {
            self.tokens.push(Token::Numeric {
                text,
                value,
                position,
            });
        } else {
            self.tokens.push(Token::IntegerConstant {
                text,
                value,
                position,
            });
        }
        Ok(())
    }

    fn emit_hex_int(
        &mut self,
        text: String,
        negative: bool,
        hex: &str,
        position: Position,
    ) -> LexResult<()> {
        let magnitude = i64::from_str_radix(hex, 16).map_err(|_| {
            LexFailure::Lex(LexError {
                message: format!("invalid hex literal '{text}'"),
                position,
            })
        })?;
        let value = if negative { -magnitude } else { magnitude };
        if !in_int_range(value) {
            return Err(LexFailure::Lex(LexError {
                message: format!("hex literal '{text}' overflows the int range"),
                position,
            }));
        }
        self.tokens.push(Token::IntegerConstant {
            text,
            value,
            position,
        });
        Ok(())
    }

    fn emit_word(
        &mut self,
        text: String,
        digits: &str,
        hex: bool,
        position: Position,
    ) -> LexResult<()> {
        let value = if hex {
            i64::from_str_radix(digits, 16)
        } else {
            digits.parse::<i64>()
        }
        .map_err(|_| {
            LexFailure::Lex(LexError {
                message: format!("invalid word literal '{text}'"),
                position,
            })
        })?;
        self.tokens.push(Token::WordConstant {
            text,
            value,
            position,
        });
        Ok(())
    }

    fn scan_digits(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump_if(|c| c.is_ascii_digit()) {
            out.push(c);
        }
        out
    }

    fn scan_hex_digits(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.bump_if(|c| c.is_ascii_hexdigit()) {
            out.push(c);
        }
        out
    }

    fn lex_string(&mut self) -> LexResult<()> {
        let position = self.offset;
        self.bump();
        let mut value = String::new();
        let mut text = String::from("\"");
        loop {
            match self.peek() {
                None => {
                    return Err(LexFailure::Incomplete(IncompleteError {
                        message: "unterminated string literal".to_string(),
                    }))
                }
                Some('"') => {
                    self.bump();
                    text.push('"');
                    break;
                }
                Some('\\') => {
                    let raw = self.scan_string_escape(position)?;
                    text.push('\\');
                    if let Some(c) = raw {
                        value.push(c);
                    }
                }
                Some(c) if (c as u32) < 0x20 => {
                    return Err(LexFailure::Lex(LexError {
                        message: "embedded control character in string literal".to_string(),
                        position: self.offset,
                    }));
                }
                Some(c) => {
                    self.bump();
                    text.push(c);
                    value.push(c);
                }
            }
        }
        self.tokens.push(Token::StringConstant {
            text,
            value,
            position,
        });
        Ok(())
    }

    /// Scans one `\...` escape inside a string literal, returning the
    /// decoded character (`None` for the whitespace-continuation escape,
    /// which contributes nothing to the value).
    fn scan_string_escape(&mut self, string_start: Position) -> LexResult<Option<char>> {
        let escape_pos = self.offset;
        self.bump(); // consume '\'
        let Some(kind) = self.peek() else {
            return Err(LexFailure::Incomplete(IncompleteError {
                message: "unterminated string literal".to_string(),
            }));
        };

        if is_sml_whitespace(kind) {
            // whitespace-continuation escape: \<ws>*\
            while self.bump_if(is_sml_whitespace).is_some() {}
            if self.bump_if(|c| c == '\\').is_none() {
                return Err(LexFailure::Lex(LexError {
                    message: "unterminated whitespace-continuation escape".to_string(),
                    position: escape_pos,
                }));
            }
            return Ok(None);
        }

        self.bump();
        let decoded = match kind {
            'a' => '\x07',
            'b' => '\x08',
            't' => '\t',
            'n' => '\n',
            'v' => '\x0b',
            'f' => '\x0c',
            'r' => '\r',
            '"' => '"',
            '\\' => '\\',
            '^' => {
                let Some(c) = self.bump() else {
                    return Err(LexFailure::Incomplete(IncompleteError {
                        message: "unterminated control-character escape".to_string(),
                    }));
                };
                let code = c as u32;
                if !(64..=95).contains(&code) {
                    return Err(LexFailure::Lex(LexError {
                        message: format!("invalid control escape character '{c}'"),
                        position: escape_pos,
                    }));
                }
                char::from_u32(code - 64).unwrap()
            }
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.bump_if(|c| c.is_ascii_hexdigit()) {
                        Some(c) => hex.push(c),
                        None => {
                            return Err(LexFailure::Lex(LexError {
                                message: "\\u escape needs exactly 4 hex digits".to_string(),
                                position: escape_pos,
                            }))
                        }
                    }
                }
                let code = u32::from_str_radix(&hex, 16).unwrap();
                char::from_u32(code).ok_or_else(|| {
                    LexFailure::Lex(LexError {
                        message: format!("invalid unicode escape \\u{hex}"),
                        position: escape_pos,
                    })
                })?
            }
            d if d.is_ascii_digit() => {
                let mut digits = String::from(d);
                for _ in 0..2 {
                    match self.bump_if(|c| c.is_ascii_digit()) {
                        Some(c) => digits.push(c),
                        None => {
                            return Err(LexFailure::Lex(LexError {
                                message: "\\ddd escape needs exactly 3 decimal digits".to_string(),
                                position: escape_pos,
                            }))
                        }
                    }
                }
                let code: u32 = digits.parse().unwrap();
                char::from_u32(code).ok_or_else(|| {
                    LexFailure::Lex(LexError {
                        message: format!("invalid decimal escape \\{digits}"),
                        position: escape_pos,
                    })
                })?
            }
            other => {
                return Err(LexFailure::Lex(LexError {
                    message: format!("unknown string escape '\\{other}'"),
                    position: escape_pos,
                }))
            }
        };
        let _ = string_start;
        Ok(Some(decoded))
    }

    fn lex_character(&mut self) -> LexResult<()> {
        let position = self.offset;
        self.bump(); // '#'
        self.bump(); // '"'
        let mut text = String::from("#\"");

        let value = match self.peek() {
            Some('\\') => self.scan_string_escape(position)?.ok_or_else(|| {
                LexFailure::Lex(LexError {
                    message: "character literal cannot use the line-continuation escape"
                        .to_string(),
                    position,
                })
            })?,
            Some(c) if (c as u32) < 0x20 => {
                return Err(LexFailure::Lex(LexError {
                    message: "embedded control character in character literal".to_string(),
                    position,
                }))
            }
            Some(c) => {
                self.bump();
                text.push(c);
                c
            }
            None => {
                return Err(LexFailure::Incomplete(IncompleteError {
                    message: "unterminated character literal".to_string(),
                }))
            }
        };

        match self.bump() {
            Some('"') => {}
            _ => {
                return Err(LexFailure::Lex(LexError {
                    message: "character literal must contain exactly one logical character"
                        .to_string(),
                    position,
                }))
            }
        }
        text.push('"');
        self.tokens.push(Token::CharacterConstant {
            text,
            value,
            position,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::lex(src, LexerOptions::default()).expect("lex should succeed")
    }

    #[test]
    fn test_lex_simple_val() {
        let tokens = lex("val x = 4*7+3;");
        assert!(matches!(tokens[0], Token::Keyword { .. }));
        assert!(matches!(tokens[1], Token::AlphanumericIdentifier { .. }));
        assert!(matches!(tokens[2], Token::Equals { .. }));
        assert!(matches!(tokens[3], Token::Numeric { value: 4, .. }));
        assert!(matches!(tokens[4], Token::Star { .. }));
    }

    #[test]
    fn test_negative_number() {
        let tokens = lex("~42");
        assert!(matches!(tokens[0], Token::IntegerConstant { value: -42, .. }));
    }

    #[test]
    fn test_word_without_digit_is_zero_then_ident() {
        let tokens = lex("0w");
        assert!(matches!(tokens[0], Token::Numeric { value: 0, .. }));
        assert!(matches!(
            &tokens[1],
            Token::AlphanumericIdentifier { text, .. } if text == "w"
        ));
    }

    #[test]
    fn test_negative_hex_prefix_not_followed_by_digit() {
        let tokens = lex("~0x");
        assert!(matches!(tokens[0], Token::IntegerConstant { value: 0, .. }));
        assert!(matches!(
            &tokens[1],
            Token::AlphanumericIdentifier { text, .. } if text == "x"
        ));
    }

    #[test]
    fn test_capital_x_after_zero() {
        let tokens = lex("0X4a");
        assert!(matches!(tokens[0], Token::Numeric { value: 0, .. }));
        assert!(matches!(
            &tokens[1],
            Token::AlphanumericIdentifier { text, .. } if text == "X4a"
        ));
    }

    #[test]
    fn test_real_literal() {
        let tokens = lex("3.14e~2");
        assert!(matches!(tokens[0], Token::RealConstant { .. }));
    }

    #[test]
    fn test_real_missing_mantissa_errors() {
        let err = Lexer::lex("3.", LexerOptions::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_long_identifier() {
        let tokens = lex("Math.pi");
        match &tokens[0] {
            Token::LongIdentifier {
                qualifiers,
                final_text,
                ..
            } => {
                assert_eq!(qualifiers, &vec!["Math".to_string()]);
                assert_eq!(final_text, "pi");
            }
            other => panic!("expected long identifier, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_comment() {
        let tokens = lex("(* outer (* inner *) still outer *) val x = 1;");
        assert!(matches!(tokens[0], Token::Keyword { .. }));
    }

    #[test]
    fn test_unterminated_comment_is_incomplete() {
        let err = Lexer::lex("(* never closed", LexerOptions::default());
        assert!(matches!(err, Err(LexFailure::Incomplete(_))));
    }

    #[test]
    fn test_op_prefix_folds_into_identifier() {
        let tokens = lex("op +");
        assert_eq!(tokens.len(), 1);
        assert!(matches!(
            &tokens[0],
            Token::SymbolicIdentifier { text, op_prefixed: true, .. } if text == "+"
        ));
    }

    #[test]
    fn test_type_variable() {
        let tokens = lex("'a ''b");
        assert!(matches!(&tokens[0], Token::TypeVariable { text, .. } if text == "'a"));
        assert!(matches!(&tokens[1], Token::EqualityTypeVariable { text, .. } if text == "''b"));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex("\"a\\nb\\tc\"");
        assert!(matches!(
            &tokens[0],
            Token::StringConstant { value, .. } if value == "a\nb\tc"
        ));
    }

    #[test]
    fn test_char_literal() {
        let tokens = lex("#\"x\"");
        assert!(matches!(tokens[0], Token::CharacterConstant { value: 'x', .. }));
    }
}
