//! Several transactions of different types multiplexed on one byte stream,
//! the way the link's priority queue can interleave them.

use bytes::Bytes;
use killalot_protocol::{
    assemble_binary, assemble_channels, assemble_command, assemble_image, Bitmap, DecodeEvent,
    DecodedMessage, OutgoingTransaction, PixelEncoding, ProtocolDecoder,
};

fn round_robin(mut txs: Vec<OutgoingTransaction>) -> Vec<u8> {
    let mut out = Vec::new();
    while txs.iter().any(|tx| !tx.is_empty()) {
        for tx in &mut txs {
            if let Some(frame) = tx.next_frame() {
                out.extend_from_slice(&frame);
            }
        }
    }
    out
}

#[test]
fn interleaved_transactions_decode_independently() {
    let pixels: Vec<u32> = (0..30).map(|i| 0x00C0_DBC0 ^ i).collect();
    let bitmap = Bitmap::from_pixels(6, 5, PixelEncoding::Argb8888, &pixels).unwrap();
    let blob: Vec<u8> = (0..200u16).map(|i| (i % 251) as u8).collect();
    let command = "calibrate gyro --axis=all --samples=512";

    let stream = round_robin(vec![
        assemble_image("img", &bitmap).unwrap(),
        assemble_binary("blob", &blob).unwrap(),
        assemble_command("cmd", command).unwrap(),
        assemble_channels("sticks", &[128; 4]).unwrap(),
    ]);

    // Arbitrary read boundaries must not matter.
    let mut decoder = ProtocolDecoder::new();
    let mut events = Vec::new();
    for chunk in stream.chunks(7) {
        decoder.feed(chunk, &mut events);
    }

    let mut got_image = None;
    let mut got_blob = None;
    let mut got_command = None;
    let mut channel_frames = 0;
    for event in events {
        match event {
            DecodeEvent::Message(DecodedMessage::Image(bmp)) => got_image = Some(bmp),
            DecodeEvent::Message(DecodedMessage::Binary(data)) => got_blob = Some(data),
            DecodeEvent::Message(DecodedMessage::Command(cmd)) => got_command = Some(cmd),
            DecodeEvent::Message(DecodedMessage::Channels { start, values }) => {
                assert_eq!(start, 0);
                assert_eq!(values, [128, 128, 128, 128, 0, 0, 0, 0]);
                channel_frames += 1;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(got_image, Some(bitmap));
    assert_eq!(got_blob, Some(Bytes::from(blob)));
    assert_eq!(got_command.as_deref(), Some(command));
    assert_eq!(channel_frames, 1);

    let stats = decoder.stats();
    assert_eq!(stats.messages, 4);
    assert_eq!(stats.short_frames + stats.bad_escapes + stats.protocol_errors, 0);
}

#[test]
fn decoder_resyncs_after_line_noise() {
    let tx = assemble_command("cmd", "ping").unwrap();
    let frame: Vec<u8> = tx.frames().flat_map(|f| f.to_vec()).collect();

    let mut stream = vec![0x55, 0xDB, 0xC0, 0x01, 0x02, 0xC0];
    stream.extend_from_slice(&frame);
    stream.extend_from_slice(&[0xAA, 0xBB]);
    stream.extend_from_slice(&frame);

    let mut events = Vec::new();
    ProtocolDecoder::new().feed(&stream, &mut events);
    assert_eq!(
        events,
        vec![
            DecodeEvent::Message(DecodedMessage::Command("ping".into())),
            DecodeEvent::Message(DecodedMessage::Command("ping".into())),
        ]
    );
}
