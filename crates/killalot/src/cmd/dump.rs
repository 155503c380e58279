use std::fs::File;
use std::io::{self, BufReader, Read};

use killalot_frame::{Datagram, DatagramReader};
use killalot_protocol::{DecodeEvent, ProtocolDecoder};
use tracing::{debug, warn};

use crate::cmd::DumpArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_datagrams, print_event, OutputFormat};

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(BufReader::new(File::open(path).map_err(|err| {
            io_error(&format!("failed opening {}", path.display()), err)
        })?)),
        None => Box::new(io::stdin().lock()),
    };

    if args.messages {
        let events = decode_messages(input)?;
        for event in &events {
            print_event(event, "capture", format);
        }
    } else {
        let (datagrams, malformed) = read_datagrams(input)?;
        print_datagrams(&datagrams, format);
        if malformed > 0 {
            warn!(malformed, "skipped malformed frames");
        }
    }
    Ok(SUCCESS)
}

fn read_datagrams<R: Read>(input: R) -> CliResult<(Vec<Datagram>, u64)> {
    let mut reader = DatagramReader::new(input);
    let datagrams = reader
        .by_ref()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| frame_error("read failed", err))?;
    Ok((datagrams, reader.malformed()))
}

fn decode_messages<R: Read>(mut input: R) -> CliResult<Vec<DecodeEvent>> {
    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(|err| io_error("read failed", err))?;

    let mut decoder = ProtocolDecoder::new();
    let mut events = Vec::new();
    decoder.feed(&bytes, &mut events);
    debug!(stats = ?decoder.stats(), "capture decoded");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use killalot_protocol::{assemble_channels, assemble_command, DecodedMessage};

    use super::*;

    fn capture() -> Vec<u8> {
        let mut bytes = vec![0x55, 0xC0, 0x01, 0xC0];
        for tx in [
            assemble_channels("ch", &[9, 8, 7]).unwrap(),
            assemble_command("cmd", "reboot").unwrap(),
        ] {
            for frame in tx.frames() {
                bytes.extend_from_slice(frame);
            }
        }
        bytes
    }

    #[test]
    fn datagrams_survive_line_noise() {
        let (datagrams, malformed) = read_datagrams(capture().as_slice()).unwrap();
        assert_eq!(datagrams.len(), 2);
        assert_eq!(datagrams[0].indicator(), killalot_frame::indicator::CHANNEL);
        assert_eq!(datagrams[1].indicator(), killalot_frame::indicator::COMMAND);
        assert_eq!(malformed, 1);
    }

    #[test]
    fn messages_are_decoded() {
        let events = decode_messages(capture().as_slice()).unwrap();
        assert_eq!(
            events,
            vec![
                DecodeEvent::Message(DecodedMessage::Channels {
                    start: 0,
                    values: [9, 8, 7, 0, 0, 0, 0, 0],
                }),
                DecodeEvent::Message(DecodedMessage::Command("reboot".into())),
            ]
        );
    }
}
