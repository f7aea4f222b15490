//! SQL lexer.
//!
//! Converts query text into a vector of [`Token`]s terminated by
//! [`TokenKind::Eof`]. Whitespace, `--` line comments and `/* */` block
//! comments are skipped.

use super::error::SyntaxError;
use super::token::{Keyword, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Tokenizes the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            let Some(ch) = self.peek(0) else {
                tokens.push(Token::new(TokenKind::Eof, self.pos));
                return Ok(tokens);
            };
            let start = self.pos;
            let kind = if ch.is_ascii_alphabetic() || ch == '_' {
                self.lex_word()
            } else if ch.is_ascii_digit() {
                self.lex_number()?
            } else if ch == '\'' {
                self.lex_string()?
            } else if ch == '"' {
                self.lex_quoted_ident()?
            } else {
                self.lex_symbol(ch)?
            };
            tokens.push(Token::new(kind, start));
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek(0) {
            self.pos += ch.len_utf8();
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn error(&self, position: usize, expected: &str, found: &str) -> SyntaxError {
        SyntaxError::new(self.input, position, expected, found)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), SyntaxError> {
        loop {
            while self.peek(0).is_some_and(char::is_whitespace) {
                self.advance();
            }
            if self.starts_with("--") {
                while let Some(ch) = self.peek(0) {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if self.starts_with("/*") {
                let start = self.pos;
                self.pos += 2;
                loop {
                    if self.starts_with("*/") {
                        self.pos += 2;
                        break;
                    }
                    if self.peek(0).is_none() {
                        return Err(self.error(start, "'*/' closing the comment", "end of input"));
                    }
                    self.advance();
                }
            } else {
                return Ok(());
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek(0).is_some_and(&pred) {
            self.advance();
        }
        &self.input[start..self.pos]
    }

    fn lex_word(&mut self) -> TokenKind {
        let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        match Keyword::lookup(word) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident(word.to_string()),
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, SyntaxError> {
        let start = self.pos;
        self.take_while(|c| c.is_ascii_digit());
        let mut fractional = false;
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            fractional = true;
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let has_sign = matches!(self.peek(1), Some('+' | '-'));
            let digit_at = if has_sign { 2 } else { 1 };
            if self.peek(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    self.advance();
                }
                self.take_while(|c| c.is_ascii_digit());
                return Ok(TokenKind::Float(self.input[start..self.pos].to_string()));
            }
            return Err(self.error(self.pos, "exponent digits", "malformed number"));
        }
        let text = self.input[start..self.pos].to_string();
        Ok(if fractional {
            TokenKind::Decimal(text)
        } else {
            TokenKind::Integer(text)
        })
    }

    fn lex_string(&mut self) -> Result<TokenKind, SyntaxError> {
        let start = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek(0) {
                None => {
                    return Err(self.error(start, "closing quote for string literal", "end of input"))
                }
                Some('\'') if self.peek(1) == Some('\'') => {
                    value.push('\'');
                    self.advance();
                    self.advance();
                }
                Some('\'') => {
                    self.advance();
                    return Ok(TokenKind::String(value));
                }
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn lex_quoted_ident(&mut self) -> Result<TokenKind, SyntaxError> {
        let start = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek(0) {
                None => {
                    return Err(self.error(start, "closing quote for identifier", "end of input"))
                }
                Some('"') if self.peek(1) == Some('"') => {
                    value.push('"');
                    self.advance();
                    self.advance();
                }
                Some('"') => {
                    self.advance();
                    if value.is_empty() {
                        return Err(self.error(start, "identifier", "empty quoted identifier"));
                    }
                    return Ok(TokenKind::Ident(value));
                }
                Some(ch) => {
                    value.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn lex_symbol(&mut self, ch: char) -> Result<TokenKind, SyntaxError> {
        const TWO_CHAR: [(&str, TokenKind); 5] = [
            ("<=", TokenKind::LtEq),
            (">=", TokenKind::GtEq),
            ("<>", TokenKind::NotEq),
            ("!=", TokenKind::NotEq),
            ("==", TokenKind::Eq),
        ];
        for (symbol, kind) in TWO_CHAR {
            if self.starts_with(symbol) {
                self.pos += symbol.len();
                return Ok(kind);
            }
        }
        let kind = match ch {
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ';' => TokenKind::Semicolon,
            '*' => TokenKind::Star,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Eq,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            other => {
                return Err(self.error(self.pos, "a token", &format!("'{other}'")));
            }
        };
        self.advance();
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_identifiers_and_symbols() {
        assert_eq!(
            kinds("select A, b_1 FROM t where a >= 1"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Ident("A".into()),
                TokenKind::Comma,
                TokenKind::Ident("b_1".into()),
                TokenKind::Keyword(Keyword::From),
                TokenKind::Ident("t".into()),
                TokenKind::Keyword(Keyword::Where),
                TokenKind::Ident("a".into()),
                TokenKind::GtEq,
                TokenKind::Integer("1".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 12.50 1e3 2.5E-2"),
            vec![
                TokenKind::Integer("1".into()),
                TokenKind::Decimal("12.50".into()),
                TokenKind::Float("1e3".into()),
                TokenKind::Float("2.5E-2".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_quoted_identifiers() {
        assert_eq!(
            kinds("'it''s' \"Select\""),
            vec![
                TokenKind::String("it's".into()),
                TokenKind::Ident("Select".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("-- header\nSELECT /* inline */ *"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Star,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_not_equal_spellings() {
        assert_eq!(
            kinds("<> !="),
            vec![TokenKind::NotEq, TokenKind::NotEq, TokenKind::Eof]
        );
    }

    #[test]
    fn test_errors_carry_position() {
        let err = Lexer::new("SELECT 'abc").tokenize().unwrap_err();
        assert_eq!(err.position, 7);

        let err = Lexer::new("SELECT &&& FROM t").tokenize().unwrap_err();
        assert_eq!(err.position, 7);
        assert_eq!(err.found, "'&'");

        let err = Lexer::new("SELECT /* never closed").tokenize().unwrap_err();
        assert_eq!(err.position, 7);
    }
}
