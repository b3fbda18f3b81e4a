//! SQL Lexer - Tokenizes SQL input text into a stream of tokens

use std::{fmt::Display, iter::Peekable, str::Chars};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    /// Identifier such as table name or column name, spelled as written
    Ident(String),
    /// Double-quoted identifier, may contain any character
    QuotedIdent(String),
    String(String),
    /// Numeric literal (integer or floating-point)
    Number(String),
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,
    Period,
    Asterisk,
    Plus,
    Minus,
    Slash,
    Percent,
    Concat,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Keyword(keyword) => f.write_str(keyword.to_str()),
            Token::Ident(ident) => f.write_str(ident),
            Token::QuotedIdent(ident) => write!(f, "\"{}\"", ident),
            Token::String(v) => write!(f, "'{}'", v),
            Token::Number(n) => f.write_str(n),
            Token::OpenParen => f.write_str("("),
            Token::CloseParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::Period => f.write_str("."),
            Token::Asterisk => f.write_str("*"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Concat => f.write_str("||"),
            Token::Equal => f.write_str("="),
            Token::NotEqual => f.write_str("!="),
            Token::LessThan => f.write_str("<"),
            Token::LessThanOrEqual => f.write_str("<="),
            Token::GreaterThan => f.write_str(">"),
            Token::GreaterThanOrEqual => f.write_str(">="),
        }
    }
}

/// Declares the keyword enum together with its spelling
macro_rules! keywords {
    ($($variant:ident => $text:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub enum Keyword {
            $($variant,)*
        }

        impl Keyword {
            /// Attempts to parse a string as a keyword (case-insensitive)
            pub fn from_str(ident: &str) -> Option<Keyword> {
                Some(match ident.to_uppercase().as_ref() {
                    $($text => Keyword::$variant,)*
                    _ => return None,
                })
            }

            pub fn to_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }
        }
    };
}

keywords! {
    All => "ALL",
    And => "AND",
    As => "AS",
    Asc => "ASC",
    Between => "BETWEEN",
    Bool => "BOOL",
    Boolean => "BOOLEAN",
    By => "BY",
    Case => "CASE",
    Cast => "CAST",
    Create => "CREATE",
    Cross => "CROSS",
    Default => "DEFAULT",
    Delete => "DELETE",
    Desc => "DESC",
    Distinct => "DISTINCT",
    Double => "DOUBLE",
    Drop => "DROP",
    Else => "ELSE",
    End => "END",
    Except => "EXCEPT",
    Exists => "EXISTS",
    False => "FALSE",
    Float => "FLOAT",
    From => "FROM",
    Group => "GROUP",
    Having => "HAVING",
    If => "IF",
    In => "IN",
    Inner => "INNER",
    Insert => "INSERT",
    Int => "INT",
    Integer => "INTEGER",
    Intersect => "INTERSECT",
    Into => "INTO",
    Is => "IS",
    Join => "JOIN",
    Key => "KEY",
    Left => "LEFT",
    Like => "LIKE",
    Limit => "LIMIT",
    Not => "NOT",
    Null => "NULL",
    Offset => "OFFSET",
    On => "ON",
    Or => "OR",
    Order => "ORDER",
    Outer => "OUTER",
    Primary => "PRIMARY",
    Real => "REAL",
    Right => "RIGHT",
    Select => "SELECT",
    Set => "SET",
    String => "STRING",
    Table => "TABLE",
    Text => "TEXT",
    Then => "THEN",
    True => "TRUE",
    Union => "UNION",
    Update => "UPDATE",
    Using => "USING",
    Values => "VALUES",
    Varchar => "VARCHAR",
    When => "WHEN",
    Where => "WHERE",
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}

pub struct Lexer<'a> {
    iter: Peekable<Chars<'a>>,
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => self
                .iter
                .peek()
                .map(|c| Err(Error::Parse(format!("unrecognized token \"{}\"", c)))),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(sql_text: &'a str) -> Self {
        Self { iter: sql_text.chars().peekable() }
    }

    fn next_if<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<char> {
        self.iter.peek().filter(|&c| predicate(*c))?;
        self.iter.next()
    }

    fn next_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> Option<String> {
        let mut value = String::new();
        while let Some(c) = self.next_if(&predicate) {
            value.push(c);
        }
        Some(value).filter(|v| !v.is_empty())
    }

    /// Skips whitespace and comments (`-- line` and `/* block */`)
    fn skip_ignored(&mut self) -> Result<()> {
        loop {
            self.next_while(|c| c.is_whitespace());
            let mut lookahead = self.iter.clone();
            match (lookahead.next(), lookahead.next()) {
                (Some('-'), Some('-')) => {
                    self.next_while(|c| c != '\n');
                }
                (Some('/'), Some('*')) => {
                    self.iter.next();
                    self.iter.next();
                    let mut prev = None;
                    loop {
                        match self.iter.next() {
                            Some('/') if prev == Some('*') => break,
                            Some(c) => prev = Some(c),
                            None => return Err(Error::Parse("unterminated block comment".into())),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan(&mut self) -> Result<Option<Token>> {
        self.skip_ignored()?;
        match self.iter.peek() {
            Some('\'') => self.scan_string(),
            Some('"') => self.scan_quoted_ident(),
            Some(c) if c.is_ascii_digit() => Ok(self.scan_number()),
            Some(c) if c.is_alphabetic() || *c == '_' => Ok(self.scan_ident()),
            Some(_) => self.scan_symbol(),
            None => Ok(None),
        }
    }

    /// Scans a quoted run of characters, where a doubled quote is an escaped quote
    fn scan_quoted(&mut self, quote: char) -> Result<String> {
        self.iter.next();
        let mut val = String::new();
        loop {
            match self.iter.next() {
                Some(c) if c == quote => match self.next_if(|c| c == quote) {
                    Some(c) => val.push(c),
                    None => break,
                },
                Some(c) => val.push(c),
                None => return Err(Error::Parse(format!("unterminated {}", quote))),
            }
        }
        Ok(val)
    }

    fn scan_string(&mut self) -> Result<Option<Token>> {
        Ok(Some(Token::String(self.scan_quoted('\'')?)))
    }

    fn scan_quoted_ident(&mut self) -> Result<Option<Token>> {
        Ok(Some(Token::QuotedIdent(self.scan_quoted('"')?)))
    }

    fn scan_number(&mut self) -> Option<Token> {
        let mut val = self.next_while(|c| c.is_ascii_digit())?;
        if let Some(sep) = self.next_if(|c| c == '.') {
            val.push(sep);
            while let Some(c) = self.next_if(|c| c.is_ascii_digit()) {
                val.push(c);
            }
        }
        Some(Token::Number(val))
    }

    /// Scans an identifier or keyword. Identifiers keep their spelling.
    fn scan_ident(&mut self) -> Option<Token> {
        let val = self.next_while(|c| c.is_alphanumeric() || c == '_')?;
        Some(Keyword::from_str(&val).map_or(Token::Ident(val), Token::Keyword))
    }

    fn scan_symbol(&mut self) -> Result<Option<Token>> {
        let Some(c) = self.iter.peek() else {
            return Ok(None);
        };
        let token = match c {
            '*' => Token::Asterisk,
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '.' => Token::Period,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' => Token::Equal,
            '<' => Token::LessThan,
            '>' => Token::GreaterThan,
            '!' => Token::NotEqual,
            '|' => Token::Concat,
            _ => return Ok(None),
        };
        self.iter.next();
        Ok(Some(match token {
            Token::Equal => {
                self.next_if(|c| c == '=');
                Token::Equal
            }
            Token::LessThan if self.next_if(|c| c == '=').is_some() => Token::LessThanOrEqual,
            Token::LessThan if self.next_if(|c| c == '>').is_some() => Token::NotEqual,
            Token::GreaterThan if self.next_if(|c| c == '=').is_some() => Token::GreaterThanOrEqual,
            // `!` and `|` only exist doubled up as `!=` and `||`
            Token::NotEqual => match self.next_if(|c| c == '=') {
                Some(_) => Token::NotEqual,
                None => return Err(Error::Parse("unrecognized token \"!\"".into())),
            },
            Token::Concat => match self.next_if(|c| c == '|') {
                Some(_) => Token::Concat,
                None => return Err(Error::Parse("unrecognized token \"|\"".into())),
            },
            token => token,
        }))
    }
}
