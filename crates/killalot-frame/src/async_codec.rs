//! [`tokio_util::codec`] adapter for use with `FramedRead`/`FramedWrite`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_datagram, Datagram};
use crate::error::FrameError;
use crate::parser::FrameParser;

/// Stream codec for Killalot datagrams.
///
/// Decoding consumes input byte by byte through a [`FrameParser`], so a
/// frame split across reads is reassembled. Malformed frames are skipped.
#[derive(Debug, Default)]
pub struct KillalotCodec {
    parser: FrameParser,
    malformed: u64,
}

impl KillalotCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames dropped so far because they were short or badly escaped.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

impl Decoder for KillalotCodec {
    type Item = Datagram;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Datagram>, FrameError> {
        while src.has_remaining() {
            match self.parser.push(src.get_u8()) {
                Ok(Some(datagram)) => return Ok(Some(datagram)),
                Ok(None) => {}
                Err(err) => {
                    debug!(error = %err, "skipping malformed frame");
                    self.malformed += 1;
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<Datagram> for KillalotCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Datagram, dst: &mut BytesMut) -> Result<(), FrameError> {
        encode_datagram(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::codec::END;
    use crate::indicator;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, KillalotCodec::new());
        let mut stream = FramedRead::new(server, KillalotCodec::new());

        let sent: Vec<Datagram> = (0..10u8)
            .map(|i| Datagram::new([indicator::BINARY, 0, 0, i], [END, i, 0, 0, 0, 0, 0, 0]))
            .collect();

        let to_send = sent.clone();
        let writer = tokio::spawn(async move {
            for dg in to_send {
                sink.send(dg).await.unwrap();
            }
        });

        let mut got = Vec::new();
        while got.len() < sent.len() {
            got.push(stream.next().await.unwrap().unwrap());
        }
        writer.await.unwrap();
        assert_eq!(got, sent);
    }

    #[test]
    fn split_input_is_reassembled() {
        let dg = Datagram::new([indicator::COMMAND, 0, 0, 3], *b"abc\0\0\0\0\0");
        let wire = dg.encode();
        let mut codec = KillalotCodec::new();

        let mut buf = BytesMut::from(&wire[..5]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&wire[5..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(dg));
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let dg = Datagram::new([indicator::HEARTBEAT, 0, 0, 0], [0; 8]);
        let mut buf = BytesMut::from(&[END, 9, END][..]);
        buf.extend_from_slice(&dg.encode());

        let mut codec = KillalotCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(dg));
        assert_eq!(codec.malformed(), 1);
    }
}
