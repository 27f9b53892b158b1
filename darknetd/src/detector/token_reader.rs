//! Whitespace token scanner for the detector's stdout.
//!
//! The detector's output is word-oriented, not line-oriented: its
//! `Enter Image Path: ` prompt carries no trailing newline, so any
//! line-buffered reader would hang on exactly the token the protocol
//! synchronizes on. [`TokenReader`] scans bytes instead, emitting each
//! maximal run of non-whitespace as one token.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUF_SIZE: usize = 4096;

/// Reads whitespace-delimited tokens from an async byte stream.
pub struct TokenReader<R> {
    reader: R,
    buf: [u8; READ_BUF_SIZE],
    start: usize,
    end: usize,
}

impl<R: AsyncRead + Unpin> TokenReader<R> {
    /// Wraps a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: [0; READ_BUF_SIZE],
            start: 0,
            end: 0,
        }
    }

    /// Returns the next token, or `None` at end of stream.
    ///
    /// A partial token terminated by end of stream is still returned;
    /// the following call returns `None`. Invalid UTF-8 is replaced
    /// rather than rejected - the detector's output is diagnostic text,
    /// not a strict encoding.
    pub async fn next_token(&mut self) -> io::Result<Option<String>> {
        let mut token = Vec::new();

        loop {
            while self.start < self.end {
                let byte = self.buf[self.start];
                self.start += 1;
                if byte.is_ascii_whitespace() {
                    if !token.is_empty() {
                        return Ok(Some(String::from_utf8_lossy(&token).into_owned()));
                    }
                } else {
                    token.push(byte);
                }
            }

            self.start = 0;
            self.end = 0;
            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                if token.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(String::from_utf8_lossy(&token).into_owned()));
            }
            self.end = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &'static [u8]) -> Vec<String> {
        let mut reader = TokenReader::new(input);
        let mut tokens = Vec::new();
        while let Some(token) = reader.next_token().await.unwrap() {
            tokens.push(token);
        }
        tokens
    }

    #[tokio::test]
    async fn splits_on_any_whitespace() {
        let tokens = collect(b"Predicted in 0.023 seconds.\nCLASS person\t87").await;
        assert_eq!(
            tokens,
            vec!["Predicted", "in", "0.023", "seconds.", "CLASS", "person", "87"]
        );
    }

    #[tokio::test]
    async fn prompt_without_trailing_newline() {
        // The detector's prompt ends with a space, not a newline.
        let tokens = collect(b"Enter Image Path: ").await;
        assert_eq!(tokens, vec!["Enter", "Image", "Path:"]);
    }

    #[tokio::test]
    async fn token_at_end_of_stream_is_emitted() {
        let tokens = collect(b"last-token").await;
        assert_eq!(tokens, vec!["last-token"]);
    }

    #[tokio::test]
    async fn empty_and_whitespace_only_streams() {
        assert!(collect(b"").await.is_empty());
        assert!(collect(b"  \n\t  ").await.is_empty());
    }

    #[tokio::test]
    async fn collapses_whitespace_runs() {
        let tokens = collect(b"a   b\n\n\nc").await;
        assert_eq!(tokens, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn token_split_across_reads() {
        // A duplex pipe delivers the token in two writes; the reader
        // must not emit until whitespace arrives.
        use tokio::io::AsyncWriteExt;

        let (mut tx, rx) = tokio::io::duplex(16);
        let handle = tokio::spawn(async move {
            tx.write_all(b"Pat").await.unwrap();
            tx.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tx.write_all(b"h: ").await.unwrap();
            tx.flush().await.unwrap();
        });

        let mut reader = TokenReader::new(rx);
        let token = reader.next_token().await.unwrap();
        assert_eq!(token.as_deref(), Some("Path:"));
        handle.await.unwrap();
    }
}
