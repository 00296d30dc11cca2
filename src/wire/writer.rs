//! Token writer

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Result, SvnError};

/// Buffers tokens for the client and writes them on [`flush`](Self::flush)
pub struct WireWriter {
    inner: Box<dyn AsyncWrite + Send + Sync + Unpin>,
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new(stream: impl AsyncWrite + Send + Sync + Unpin + 'static) -> Self {
        Self {
            inner: Box::new(stream),
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn list_begin(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b"( ");
        self
    }

    pub fn list_end(&mut self) -> &mut Self {
        self.buf.extend_from_slice(b") ");
        self
    }

    pub fn word(&mut self, word: &str) -> &mut Self {
        debug_assert!(is_valid_word(word), "invalid wire word: {:?}", word);
        self.buf.extend_from_slice(word.as_bytes());
        self.buf.push(b' ');
        self
    }

    pub fn number(&mut self, number: u64) -> &mut Self {
        self.buf.extend_from_slice(number.to_string().as_bytes());
        self.buf.push(b' ');
        self
    }

    pub fn string(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        let data = data.as_ref();
        self.buf.extend_from_slice(data.len().to_string().as_bytes());
        self.buf.push(b':');
        self.buf.extend_from_slice(data);
        self.buf.push(b' ');
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.word(if value { "true" } else { "false" })
    }

    /// `( ? number )`
    pub fn optional_number(&mut self, value: Option<u64>) -> &mut Self {
        self.list_begin();
        if let Some(value) = value {
            self.number(value);
        }
        self.list_end()
    }

    /// `( ? string )`
    pub fn optional_string(&mut self, value: Option<impl AsRef<[u8]>>) -> &mut Self {
        self.list_begin();
        if let Some(value) = value {
            self.string(value);
        }
        self.list_end()
    }

    /// `( success ( ) )`
    pub fn success_empty(&mut self) -> &mut Self {
        self.list_begin()
            .word("success")
            .list_begin()
            .list_end()
            .list_end()
    }

    /// `( failure ( message ) )` as used by the handshake
    pub fn failure_message(&mut self, message: &str) -> &mut Self {
        self.list_begin()
            .word("failure")
            .list_begin()
            .string(message)
            .list_end()
            .list_end()
    }

    /// `( failure ( ( code message file line ) ) )` as used by commands
    pub fn failure_error(&mut self, error: &SvnError) -> &mut Self {
        self.list_begin()
            .word("failure")
            .list_begin()
            .list_begin()
            .number(error.code())
            .string(error.to_string())
            .string("")
            .number(0)
            .list_end()
            .list_end()
            .list_end()
    }

    /// Bytes written since the last flush
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drop everything written since the last flush
    pub fn discard(&mut self) {
        self.buf.clear();
    }

    pub async fn flush(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf).await?;
            self.buf.clear();
        }
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and close the write side of the stream
    pub async fn shutdown(&mut self) -> Result<()> {
        self.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }
}

fn is_valid_word(word: &str) -> bool {
    let mut bytes = word.bytes();
    matches!(bytes.next(), Some(b'a'..=b'z' | b'A'..=b'Z'))
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
