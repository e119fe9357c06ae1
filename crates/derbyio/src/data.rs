use bytes::Buf;
use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

#[derive(Debug)]
pub struct DataReader<R> {
    inner: R,
    buf: BytesMut,
    max_str_len: usize,
}

impl<R> DataReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(1024),
            max_str_len: u16::MAX as usize,
        }
    }

    pub fn max_str_len(mut self, max: usize) -> Self {
        self.max_str_len = max.max(1);
        self
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> DataReader<R> {
    /// Read one string with a `u16` big-endian byte-length prefix.
    ///
    /// Returns:
    /// - `Ok(Some(s))` for a complete string,
    /// - `Ok(None)` on clean EOF with no buffered data.
    pub async fn read_string(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if self.buf.len() >= 2 {
                let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
                if len > self.max_str_len {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "string too long",
                    ));
                }

                if self.buf.len() >= 2 + len {
                    self.buf.advance(2);
                    let payload = self.buf.split_to(len);
                    let s = std::str::from_utf8(&payload).map_err(|_| {
                        std::io::Error::new(std::io::ErrorKind::InvalidData, "string not utf-8")
                    })?;
                    return Ok(Some(s.to_string()));
                }
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "eof while reading string",
                ));
            }
        }
    }

    /// Read one big-endian `i32`.
    ///
    /// Returns `Ok(None)` on clean EOF with no buffered data.
    pub async fn read_i32(&mut self) -> std::io::Result<Option<i32>> {
        loop {
            if self.buf.len() >= 4 {
                let v = i32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
                self.buf.advance(4);
                return Ok(Some(v));
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "eof while reading int",
                ));
            }
        }
    }
}

#[derive(Debug)]
pub struct DataWriter<W> {
    inner: W,
}

impl<W> DataWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> DataWriter<W> {
    /// Write one string with a `u16` big-endian byte-length prefix.
    pub async fn write_string(&mut self, s: &str) -> std::io::Result<()> {
        let len: u16 = s
            .len()
            .try_into()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "string too long"))?;

        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(s.as_bytes()).await?;
        Ok(())
    }

    /// Write one big-endian `i32`.
    pub async fn write_i32(&mut self, v: i32) -> std::io::Result<()> {
        self.inner.write_all(&v.to_be_bytes()).await
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush().await
    }
}
