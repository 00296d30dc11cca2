//! Token reader

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::{Result, SvnError};
use crate::wire::token::Token;

/// Upper bound for a single string token unless configured otherwise
pub const DEFAULT_MAX_STRING_LENGTH: usize = 64 * 1024 * 1024;

/// Longest number accepted before the value is rejected as malformed
const MAX_NUMBER_DIGITS: usize = 20;

/// Reads typed tokens from the client stream
pub struct WireReader {
    inner: BufReader<Box<dyn AsyncRead + Send + Sync + Unpin>>,
    depth: usize,
    peeked: Option<Token>,
    max_string_length: usize,
}

impl WireReader {
    pub fn new(stream: impl AsyncRead + Send + Sync + Unpin + 'static) -> Self {
        Self::with_limit(stream, DEFAULT_MAX_STRING_LENGTH)
    }

    pub fn with_limit(stream: impl AsyncRead + Send + Sync + Unpin + 'static, max_string_length: usize) -> Self {
        Self {
            inner: BufReader::new(Box::new(stream)),
            depth: 0,
            peeked: None,
            max_string_length,
        }
    }

    /// List nesting depth of the consumed tokens.
    ///
    /// A peeked token has already moved the raw counter, so it is undone here.
    pub fn depth(&self) -> usize {
        match self.peeked {
            Some(Token::ListBegin) => self.depth - 1,
            Some(Token::ListEnd) => self.depth + 1,
            _ => self.depth,
        }
    }

    /// Look at the next token without consuming it
    pub async fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            let token = self.read_raw().await?;
            self.peeked = Some(token);
        }
        self.peeked
            .as_ref()
            .ok_or_else(|| SvnError::internal("peeked token vanished"))
    }

    /// Read the next token of any type
    pub async fn read_token(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.read_raw().await,
        }
    }

    pub async fn read_list_begin(&mut self) -> Result<()> {
        match self.read_token().await? {
            Token::ListBegin => Ok(()),
            other => Err(unexpected("list-begin", &other)),
        }
    }

    pub async fn read_list_end(&mut self) -> Result<()> {
        match self.read_token().await? {
            Token::ListEnd => Ok(()),
            other => Err(unexpected("list-end", &other)),
        }
    }

    pub async fn read_word(&mut self) -> Result<String> {
        match self.read_token().await? {
            Token::Word(word) => Ok(word),
            other => Err(unexpected("word", &other)),
        }
    }

    pub async fn read_number(&mut self) -> Result<u64> {
        match self.read_token().await? {
            Token::Number(number) => Ok(number),
            other => Err(unexpected("number", &other)),
        }
    }

    pub async fn read_string(&mut self) -> Result<Vec<u8>> {
        match self.read_token().await? {
            Token::Str(bytes) => Ok(bytes),
            other => Err(unexpected("string", &other)),
        }
    }

    /// Read a string or a word as UTF-8 text
    pub async fn read_text(&mut self) -> Result<String> {
        match self.read_token().await? {
            Token::Word(word) => Ok(word),
            Token::Str(bytes) => {
                String::from_utf8(bytes).map_err(|_| SvnError::syntax("string is not valid UTF-8"))
            }
            other => Err(unexpected("string", &other)),
        }
    }

    /// Read a `true`/`false` word
    pub async fn read_bool(&mut self) -> Result<bool> {
        let word = self.read_word().await?;
        match word.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(SvnError::syntax(format!("expected boolean, got '{}'", other))),
        }
    }

    /// Read a `( word... )` list
    pub async fn read_word_list(&mut self) -> Result<Vec<String>> {
        self.read_list_begin().await?;
        let mut words = Vec::new();
        loop {
            match self.read_token().await? {
                Token::ListEnd => return Ok(words),
                Token::Word(word) => words.push(word),
                other => return Err(unexpected("word", &other)),
            }
        }
    }

    /// Read a `( string... )` list
    pub async fn read_text_list(&mut self) -> Result<Vec<String>> {
        self.read_list_begin().await?;
        let mut items = Vec::new();
        while !self.at_list_end().await? {
            items.push(self.read_text().await?);
        }
        self.read_list_end().await?;
        Ok(items)
    }

    /// Read `( ? number )`
    pub async fn read_optional_number(&mut self) -> Result<Option<u64>> {
        self.read_list_begin().await?;
        if self.at_list_end().await? {
            self.read_list_end().await?;
            return Ok(None);
        }
        let value = self.read_number().await?;
        self.skip_to_list_end().await?;
        Ok(Some(value))
    }

    /// Read `( ? string )` as text
    pub async fn read_optional_text(&mut self) -> Result<Option<String>> {
        self.read_list_begin().await?;
        if self.at_list_end().await? {
            self.read_list_end().await?;
            return Ok(None);
        }
        let value = self.read_text().await?;
        self.skip_to_list_end().await?;
        Ok(Some(value))
    }

    /// Read `( ? string )` as raw bytes
    pub async fn read_optional_string(&mut self) -> Result<Option<Vec<u8>>> {
        self.read_list_begin().await?;
        if self.at_list_end().await? {
            self.read_list_end().await?;
            return Ok(None);
        }
        let value = self.read_string().await?;
        self.skip_to_list_end().await?;
        Ok(Some(value))
    }

    /// Read `( ? word )`
    pub async fn read_optional_word(&mut self) -> Result<Option<String>> {
        self.read_list_begin().await?;
        if self.at_list_end().await? {
            self.read_list_end().await?;
            return Ok(None);
        }
        let value = self.read_word().await?;
        self.skip_to_list_end().await?;
        Ok(Some(value))
    }

    /// True when the next token closes the current list
    pub async fn at_list_end(&mut self) -> Result<bool> {
        Ok(matches!(self.peek().await?, Token::ListEnd))
    }

    /// Consume everything up to and including the `)` closing the current list.
    ///
    /// Newer clients append fields to many tuples; parsers read the fields
    /// they know and call this to drop the rest.
    pub async fn skip_to_list_end(&mut self) -> Result<()> {
        let target = self.depth().checked_sub(1).ok_or_else(|| {
            SvnError::syntax("skip_to_list_end called outside of a list")
        })?;
        loop {
            let token = self.read_token().await?;
            if token == Token::ListEnd && self.depth == target {
                return Ok(());
            }
        }
    }

    /// Consume one complete item, descending into lists
    pub async fn skip_item(&mut self) -> Result<()> {
        if self.read_token().await? == Token::ListBegin {
            self.skip_to_list_end().await?;
        }
        Ok(())
    }

    async fn read_raw(&mut self) -> Result<Token> {
        let first = loop {
            match self.next_byte().await? {
                None => return Err(self.end_of_stream(false)),
                Some(byte) if is_space(byte) => continue,
                Some(byte) => break byte,
            }
        };

        match first {
            b'(' => {
                self.expect_separator().await?;
                self.depth += 1;
                Ok(Token::ListBegin)
            }
            b')' => {
                if self.depth == 0 {
                    return Err(SvnError::syntax("unbalanced list end"));
                }
                self.depth -= 1;
                self.expect_separator().await?;
                Ok(Token::ListEnd)
            }
            b'0'..=b'9' => self.read_number_or_string(first).await,
            b'a'..=b'z' | b'A'..=b'Z' => self.read_word_rest(first).await,
            other => Err(SvnError::syntax(format!(
                "unexpected byte 0x{:02x} at token start",
                other
            ))),
        }
    }

    async fn read_number_or_string(&mut self, first: u8) -> Result<Token> {
        let mut digits = 1;
        let mut value = u64::from(first - b'0');
        loop {
            let byte = match self.next_byte().await? {
                Some(byte) => byte,
                None => return Err(self.end_of_stream(true)),
            };
            match byte {
                b'0'..=b'9' => {
                    digits += 1;
                    if digits > MAX_NUMBER_DIGITS {
                        return Err(SvnError::syntax("number too long"));
                    }
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(u64::from(byte - b'0')))
                        .ok_or_else(|| SvnError::syntax("number out of range"))?;
                }
                b':' => return self.read_string_body(value).await,
                byte if is_space(byte) => return Ok(Token::Number(value)),
                other => {
                    return Err(SvnError::syntax(format!(
                        "unexpected byte 0x{:02x} in number",
                        other
                    )))
                }
            }
        }
    }

    async fn read_string_body(&mut self, length: u64) -> Result<Token> {
        let length = usize::try_from(length)
            .ok()
            .filter(|length| *length <= self.max_string_length)
            .ok_or_else(|| {
                SvnError::syntax(format!(
                    "string of {} bytes exceeds limit of {}",
                    length, self.max_string_length
                ))
            })?;
        let mut bytes = vec![0u8; length];
        self.inner.read_exact(&mut bytes).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SvnError::syntax("end of stream inside string")
            } else {
                SvnError::Io(e)
            }
        })?;
        self.expect_separator().await?;
        Ok(Token::Str(bytes))
    }

    async fn read_word_rest(&mut self, first: u8) -> Result<Token> {
        let mut word = vec![first];
        loop {
            let byte = match self.next_byte().await? {
                Some(byte) => byte,
                None => return Err(self.end_of_stream(true)),
            };
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => word.push(byte),
                byte if is_space(byte) => break,
                other => {
                    return Err(SvnError::syntax(format!(
                        "unexpected byte 0x{:02x} in word",
                        other
                    )))
                }
            }
        }
        // Word bytes are restricted to ASCII above.
        Ok(Token::Word(String::from_utf8_lossy(&word).into_owned()))
    }

    /// Every token is terminated by whitespace. End of stream also terminates
    /// the final token; the next read reports it.
    async fn expect_separator(&mut self) -> Result<()> {
        let byte = {
            let buf = self.inner.fill_buf().await?;
            match buf.first() {
                None => return Ok(()),
                Some(byte) => *byte,
            }
        };
        if !is_space(byte) {
            return Err(SvnError::syntax(format!(
                "expected whitespace, got byte 0x{:02x}",
                byte
            )));
        }
        self.inner.consume(1);
        Ok(())
    }

    async fn next_byte(&mut self) -> Result<Option<u8>> {
        let buf = self.inner.fill_buf().await?;
        let Some(byte) = buf.first().copied() else {
            return Ok(None);
        };
        self.inner.consume(1);
        Ok(Some(byte))
    }

    fn end_of_stream(&self, partial_token: bool) -> SvnError {
        if partial_token {
            SvnError::syntax("end of stream inside token")
        } else if self.depth > 0 {
            SvnError::syntax(format!("end of stream with {} unclosed list(s)", self.depth))
        } else {
            SvnError::Disconnected
        }
    }
}

fn is_space(byte: u8) -> bool {
    byte == b' ' || byte == b'\n'
}

fn unexpected(expected: &str, got: &Token) -> SvnError {
    SvnError::syntax(format!("expected {}, got {} '{}'", expected, got.kind(), got))
}
