use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::codec::Datagram;
use crate::error::{FrameError, Result};
use crate::parser::FrameParser;

const READ_CHUNK_SIZE: usize = 256;

/// Reads datagrams from any `Read` stream.
///
/// Malformed frames are skipped and counted; callers only ever see complete
/// datagrams.
pub struct DatagramReader<T> {
    inner: T,
    buf: BytesMut,
    parser: FrameParser,
    malformed: u64,
}

impl<T: Read> DatagramReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            parser: FrameParser::new(),
            malformed: 0,
        }
    }

    /// Read the next datagram (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at EOF; a partial trailing
    /// frame is discarded.
    pub fn read_datagram(&mut self) -> Result<Datagram> {
        loop {
            while self.buf.has_remaining() {
                let byte = self.buf.get_u8();
                match self.parser.push(byte) {
                    Ok(Some(datagram)) => return Ok(datagram),
                    Ok(None) => {}
                    Err(err) => {
                        debug!(error = %err, "skipping malformed frame");
                        self.malformed += 1;
                    }
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Frames dropped so far because they were short or badly escaped.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for DatagramReader<T> {
    type Item = Result<Datagram>;

    /// Yields datagrams until EOF; I/O errors are yielded once.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_datagram() {
            Ok(datagram) => Some(Ok(datagram)),
            Err(FrameError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{END, ESC};
    use crate::indicator;

    fn wire(datagrams: &[Datagram]) -> Vec<u8> {
        datagrams.iter().flat_map(|d| d.encode().to_vec()).collect()
    }

    #[test]
    fn reads_consecutive_datagrams() {
        let a = Datagram::new([indicator::COMMAND, 0, 0, 2], *b"ok\0\0\0\0\0\0");
        let b = Datagram::new([indicator::BINARY, 0, 0, 1], [END, ESC, 0, 0, 0, 0, 0, 0]);
        let mut reader = DatagramReader::new(Cursor::new(wire(&[a, b])));

        assert_eq!(reader.read_datagram().unwrap(), a);
        assert_eq!(reader.read_datagram().unwrap(), b);
        assert!(matches!(
            reader.read_datagram(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn malformed_frames_are_counted_and_skipped() {
        let good = Datagram::new([indicator::HEARTBEAT, 0, 0, 0], [0; 8]);
        let mut bytes = vec![END, 1, 2, END];
        bytes.extend_from_slice(&good.encode());

        let mut reader = DatagramReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_datagram().unwrap(), good);
        assert_eq!(reader.malformed(), 1);
    }

    #[test]
    fn byte_by_byte_source() {
        let dg = Datagram::new([indicator::CHANNEL, 0, 0, 16], [5; 8]);
        let source = ByteByByteReader {
            bytes: dg.encode().to_vec(),
            pos: 0,
        };
        let mut reader = DatagramReader::new(source);
        assert_eq!(reader.read_datagram().unwrap(), dg);
    }

    #[test]
    fn iterator_stops_at_eof() {
        let frames: Vec<Datagram> = (0..4u8)
            .map(|i| Datagram::new([indicator::CHANNEL, 0, 0, i * 8], [i; 8]))
            .collect();
        let reader = DatagramReader::new(Cursor::new(wire(&frames)));
        let got: Vec<Datagram> = reader.map(|r| r.unwrap()).collect();
        assert_eq!(got, frames);
    }

    #[test]
    fn interrupted_read_retries() {
        let dg = Datagram::new([indicator::HEARTBEAT, 0, 0, 0], [0; 8]);
        let source = InterruptedOnce {
            interrupted: false,
            inner: Cursor::new(dg.encode().to_vec()),
        };
        let mut reader = DatagramReader::new(source);
        assert_eq!(reader.read_datagram().unwrap(), dg);
    }

    #[test]
    fn io_error_propagates() {
        let mut reader = DatagramReader::new(FailingReader);
        let err = reader.read_datagram().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedOnce {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedOnce {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(ErrorKind::Interrupted.into());
            }
            self.inner.read(buf)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(ErrorKind::BrokenPipe.into())
        }
    }
}
