//! Token definitions for the SQL lexer.

use std::fmt;

/// Reserved words. Matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    And,
    As,
    Asc,
    By,
    Create,
    Desc,
    Eq,
    Exists,
    Explain,
    False,
    From,
    Ge,
    Group,
    Gt,
    Having,
    If,
    In,
    Inner,
    Insert,
    Into,
    Is,
    Join,
    Le,
    Limit,
    Lt,
    Ne,
    Not,
    Null,
    Offset,
    On,
    Or,
    Order,
    Select,
    Table,
    True,
    Values,
    Where,
}

impl Keyword {
    pub fn lookup(word: &str) -> Option<Keyword> {
        let keyword = match word.to_ascii_uppercase().as_str() {
            "AND" => Keyword::And,
            "AS" => Keyword::As,
            "ASC" => Keyword::Asc,
            "BY" => Keyword::By,
            "CREATE" => Keyword::Create,
            "DESC" => Keyword::Desc,
            "EQ" => Keyword::Eq,
            "EXISTS" => Keyword::Exists,
            "EXPLAIN" => Keyword::Explain,
            "FALSE" => Keyword::False,
            "FROM" => Keyword::From,
            "GE" => Keyword::Ge,
            "GROUP" => Keyword::Group,
            "GT" => Keyword::Gt,
            "HAVING" => Keyword::Having,
            "IF" => Keyword::If,
            "IN" => Keyword::In,
            "INNER" => Keyword::Inner,
            "INSERT" => Keyword::Insert,
            "INTO" => Keyword::Into,
            "IS" => Keyword::Is,
            "JOIN" => Keyword::Join,
            "LE" => Keyword::Le,
            "LIMIT" => Keyword::Limit,
            "LT" => Keyword::Lt,
            "NE" => Keyword::Ne,
            "NOT" => Keyword::Not,
            "NULL" => Keyword::Null,
            "OFFSET" => Keyword::Offset,
            "ON" => Keyword::On,
            "OR" => Keyword::Or,
            "ORDER" => Keyword::Order,
            "SELECT" => Keyword::Select,
            "TABLE" => Keyword::Table,
            "TRUE" => Keyword::True,
            "VALUES" => Keyword::Values,
            "WHERE" => Keyword::Where,
            _ => return None,
        };
        Some(keyword)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}").to_ascii_uppercase();
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    /// Bare or double-quoted identifier; case preserved.
    Ident(String),
    /// Digits only.
    Integer(String),
    /// Digits with a fractional part and no exponent.
    Decimal(String),
    /// Number with an exponent.
    Float(String),
    /// Single-quoted string with `''` escapes resolved.
    String(String),
    Comma,
    Dot,
    LParen,
    RParen,
    Semicolon,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(k) => write!(f, "keyword {k}"),
            TokenKind::Ident(s) => write!(f, "identifier {s}"),
            TokenKind::Integer(s) | TokenKind::Decimal(s) | TokenKind::Float(s) => {
                write!(f, "number {s}")
            }
            TokenKind::String(s) => write!(f, "string '{s}'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Dot => write!(f, "'.'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::Eq => write!(f, "'='"),
            TokenKind::NotEq => write!(f, "'!='"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::LtEq => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::GtEq => write!(f, "'>='"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, position: usize) -> Self {
        Self { kind, position }
    }
}
