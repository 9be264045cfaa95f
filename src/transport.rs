//! Instrument I/O and line framing
//!
//! Every driver talks to its instrument through the [`Transport`] capability: write a command,
//! read a line, or push a raw binary frame. [`LineTransport`] implements it over any async byte
//! stream, so a driver never knows whether it sits on a local RS-232 port, a USB serial adapter or
//! a TCP bridge to a GPIB bus.
//!
//! # Cancel Safety
//! Reading a line is cancel safe: bytes are only ever appended to the read buffer until a complete
//! line is found. A `query` is **not** cancel safe. Cancelling after the write but before the read
//! leaves the reply in the stream, and it will be taken as the reply to the next query.

use async_trait::async_trait;
use futures::FutureExt;
use std::{ io, time::Duration };
use tokio::io::{ AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt };
use crate::error::{ Error, Result };

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Transport: Send
{
    /// Sends a command followed by the write terminator
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Reads one line and returns it without its terminator or trailing whitespace
    async fn read_line(&mut self) -> Result<String>;

    /// Sends bytes exactly as given and flushes them out
    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Throws away anything already received but not yet read
    async fn clear_input(&mut self) -> Result<()>;

    async fn query(&mut self, command: &str) -> Result<String>
    {
        self.write(command).await?;
        self.read_line().await
    }

    /// A query whose reply may take up to `timeout` instead of the usual read timeout
    ///
    /// For instruments which hold the reply until a long operation finishes.
    async fn query_within(&mut self, command: &str, _timeout: Duration) -> Result<String>
    {
        self.query(command).await
    }
}

#[async_trait]
impl <S> Transport for Box<S>
    where S: Transport + ?Sized
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        (**self).write(command).await
    }

    async fn read_line(&mut self) -> Result<String>
    {
        (**self).read_line().await
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()>
    {
        (**self).write_raw(bytes).await
    }

    async fn clear_input(&mut self) -> Result<()>
    {
        (**self).clear_input().await
    }

    async fn query(&mut self, command: &str) -> Result<String>
    {
        (**self).query(command).await
    }

    async fn query_within(&mut self, command: &str, timeout: Duration) -> Result<String>
    {
        (**self).query_within(command, timeout).await
    }
}

/// Line-oriented transport over an async byte stream
pub struct LineTransport<T>
{
    line_ending: &'static str,
    read_terminator: u8,
    timeout: Duration,
    io_handle: T,
    read_buf: Vec<u8>,
}

impl <T> LineTransport<T>
    where T: AsyncRead + AsyncWrite + Unpin + Send
{
    /// Wraps a stream using `\n` in both directions and the default timeout
    ///
    /// Opening the stream is left to the caller (see [`crate::connection`]) so that any hardware
    /// interface, or an in-memory mock, can be used.
    pub fn with(io_handle: T) -> Self
    {
        Self {
            line_ending: "\n",
            read_terminator: b'\n',
            timeout: DEFAULT_TIMEOUT,
            io_handle: io_handle,
            read_buf: Vec::with_capacity(128),
        }
    }

    /// Sets the string appended to every command
    pub fn line_ending(mut self, line_ending: &'static str) -> Self
    {
        self.line_ending = line_ending;
        self
    }

    /// Sets the byte which ends a reply line
    pub fn read_terminator(mut self, terminator: u8) -> Self
    {
        self.read_terminator = terminator;
        self
    }

    /// Sets how long a single `read_line` may wait for its terminator
    pub fn timeout(mut self, timeout: Duration) -> Self
    {
        self.timeout = timeout;
        self
    }

    pub fn into_inner(self) -> T
    {
        self.io_handle
    }

    /// Drops the first `n` bytes from the read buffer
    ///
    /// Drops all bytes if `n >= self.read_buf.len()`
    fn drop_first(&mut self, n: usize)
    {
        if n >= self.read_buf.len() {
            self.read_buf.clear();
        }
        else {
            self.read_buf.drain(..n);
            self.read_buf.shrink_to(128);
        }
    }

    /// Returns the index of the first terminator in the read buffer at or after `start_hint`
    fn find_line_ending(&self, start_hint: usize) -> Option<usize>
    {
        self.read_buf
            .iter()
            .skip(start_hint)
            .position(|byte| *byte == self.read_terminator)
            .map(|offset| offset + start_hint)
    }

    /// Reads until the buffer holds a full line and returns the line's length including its
    /// terminator
    async fn fill_line(&mut self) -> Result<usize>
    {
        let mut searched = 0;
        let mut end_index = self.find_line_ending(searched);

        while end_index.is_none() {
            searched = self.read_buf.len();
            let mut temp_buf = [0u8; 64];
            let bytes_read = self.io_handle.read(&mut temp_buf[..]).await?;

            if bytes_read == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }

            self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);
            end_index = self.find_line_ending(searched);
        }

        Ok(end_index.map_or(0, |index| index + 1))
    }
}

#[async_trait]
impl <T> Transport for LineTransport<T>
    where T: AsyncRead + AsyncWrite + Unpin + Send
{
    async fn write(&mut self, command: &str) -> Result<()>
    {
        log::debug!("-> {:?}", command);
        let serialized = format!("{}{}", command, self.line_ending);
        self.io_handle.write_all(serialized.as_bytes()).await?;
        self.io_handle.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String>
    {
        let after = self.timeout;
        let line_len = tokio::time::timeout(after, self.fill_line())
            .await
            .map_err(|_| Error::Timeout { after: after })??;

        let decoded = String::from_utf8(self.read_buf[..line_len].to_vec());
        self.drop_first(line_len);

        match decoded {
            Ok(line) => {
                let line = line.trim_end().to_owned();
                log::debug!("<- {:?}", line);
                Ok(line)
            },
            Err(err) => Err(Error::parse(&String::from_utf8_lossy(err.as_bytes()), "a UTF-8 line")),
        }
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> Result<()>
    {
        log::debug!("-> {:?}", bytes);
        self.io_handle.write_all(bytes).await?;
        self.io_handle.flush().await?;
        Ok(())
    }

    async fn clear_input(&mut self) -> Result<()>
    {
        let mut discarded = self.read_buf.len();
        self.read_buf.clear();

        // drain whatever the stream can hand over without waiting
        let mut temp_buf = [0u8; 64];
        while let Some(Ok(bytes_read)) = self.io_handle.read(&mut temp_buf[..]).now_or_never() {
            if bytes_read == 0 {
                break;
            }
            discarded += bytes_read;
        }

        if discarded > 0 {
            log::debug!("discarded {} stale bytes", discarded);
        }

        Ok(())
    }

    async fn query_within(&mut self, command: &str, timeout: Duration) -> Result<String>
    {
        let usual = std::mem::replace(&mut self.timeout, timeout);
        let reply = self.query(command).await;
        self.timeout = usual;
        reply
    }
}
