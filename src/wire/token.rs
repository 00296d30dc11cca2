//! Wire token type

use std::fmt;

/// A single token of the ra_svn stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare atom such as `success` or `set-path`
    Word(String),
    /// Non-negative decimal number
    Number(u64),
    /// Length-prefixed raw bytes
    Str(Vec<u8>),
    /// `(`
    ListBegin,
    /// `)`
    ListEnd,
}

impl Token {
    /// Short name used in syntax error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Word(_) => "word",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::ListBegin => "list-begin",
            Self::ListEnd => "list-end",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(word) => write!(f, "{}", word),
            Self::Number(number) => write!(f, "{}", number),
            Self::Str(bytes) => write!(f, "{}:{}", bytes.len(), String::from_utf8_lossy(bytes)),
            Self::ListBegin => write!(f, "("),
            Self::ListEnd => write!(f, ")"),
        }
    }
}
