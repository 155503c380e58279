use std::fs;

use bytes::Bytes;
use killalot_link::{LinkConfig, LinkError, LinkListener, TransportManager};
use killalot_protocol::{
    assemble, Bitmap, DataType, DecodeListener, Payload, ProtocolError, RequestKind,
};
use tracing::{debug, warn};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    assembly_error, io_error, link_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS,
    USAGE,
};
use crate::output::{print_send_report, OutputFormat, SendReport};

/// Remembers why a connection attempt failed; anything the peer sends
/// back is only logged.
#[derive(Default)]
struct SendListener {
    failure: Option<LinkError>,
}

impl DecodeListener for SendListener {
    fn on_recv_channels(&mut self, start: u16, _values: [u8; 8]) {
        debug!(start, "ignoring channels from peer");
    }

    fn on_recv_command(&mut self, command: String) {
        debug!(%command, "ignoring command from peer");
    }

    fn on_recv_bitmap(&mut self, bitmap: Bitmap) {
        debug!(width = bitmap.width(), height = bitmap.height(), "ignoring bitmap from peer");
    }

    fn on_recv_binary(&mut self, data: Bytes) {
        debug!(len = data.len(), "ignoring binary from peer");
    }

    fn on_request(&mut self, kind: RequestKind, code: u8) {
        debug!(?kind, code, "peer request");
    }

    fn on_error(&mut self, error: ProtocolError) {
        warn!(%error, "protocol error from peer");
    }
}

impl LinkListener for SendListener {
    fn on_connect_failure(&mut self, error: LinkError) {
        self.failure = Some(error);
    }
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;
    let tx = assemble(args.name.as_str(), &payload)
        .map_err(|err| assembly_error("invalid payload", err))?;
    let (frames, bytes) = (tx.total(), tx.pending_bytes());

    let config = LinkConfig {
        auto_drain: false,
        ..LinkConfig::default()
    };
    let manager = TransportManager::new(SendListener::default(), config)
        .with_connector(args.addr.connector(timeout));

    manager
        .connect()
        .map_err(|err| link_error("connect failed", err))?
        .join()
        .map_err(|_| CliError::new(INTERNAL, "connect thread panicked"))?;
    if let Some(err) = manager.listener().failure.take() {
        return Err(link_error("connect failed", err));
    }

    manager
        .try_enqueue(tx)
        .map_err(|err| link_error("enqueue failed", err))?;
    let sent = manager.flush().map_err(|err| link_error("send failed", err));
    manager.disconnect(None);
    debug!(frames = sent?, "flushed");

    print_send_report(
        &SendReport {
            name: args.name,
            kind: payload_kind(&payload),
            frames,
            bytes,
            peer: args.addr.to_string(),
        },
        format,
    );
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Payload> {
    if let Some(command) = &args.command {
        return Ok(Payload::Command(command.clone()));
    }
    if let Some(channels) = &args.channels {
        return Ok(Payload::Channels(channels.clone()));
    }
    if let Some(path) = &args.binary {
        let data = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return Ok(Payload::Binary(Bytes::from(data)));
    }
    if let Some(path) = &args.image {
        let (Some(width), Some(height)) = (args.width, args.height) else {
            return Err(CliError::new(USAGE, "--image requires --width and --height"));
        };
        let data = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        let bitmap = Bitmap::new(width, height, args.encoding.into(), data)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid image: {err}")))?;
        return Ok(Payload::Image(bitmap));
    }
    Err(CliError::new(USAGE, "no payload given"))
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Channels(_) => DataType::Channel.as_str(),
        Payload::Command(_) => DataType::Command.as_str(),
        Payload::Image(_) => DataType::Image.as_str(),
        Payload::Binary(_) => DataType::Binary.as_str(),
        Payload::Control(_) => "control",
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cmd::Command;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn send_args(argv: &[&str]) -> SendArgs {
        let argv = ["killalot", "send", "127.0.0.1:1"].iter().chain(argv);
        match TestCli::try_parse_from(argv).unwrap().command {
            Command::Send(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn resolves_inline_payloads() {
        let args = send_args(&["--command", "spin 90"]);
        assert_eq!(resolve_payload(&args).unwrap(), Payload::Command("spin 90".into()));

        let args = send_args(&["--channels", "1,2,250"]);
        assert_eq!(resolve_payload(&args).unwrap(), Payload::Channels(vec![1, 2, 250]));
    }

    #[test]
    fn image_file_must_match_geometry() {
        let path = std::env::temp_dir().join(format!("killalot-img-{}.raw", std::process::id()));
        fs::write(&path, [0u8; 8]).unwrap();
        let path_arg = path.to_string_lossy().to_string();

        let ok = send_args(&[
            "--image", &path_arg, "--width", "2", "--height", "2", "--encoding", "rgb565",
        ]);
        assert!(matches!(resolve_payload(&ok).unwrap(), Payload::Image(b) if b.pixel_count() == 4));

        let wrong = send_args(&["--image", &path_arg, "--width", "4", "--height", "4"]);
        assert_eq!(resolve_payload(&wrong).unwrap_err().code, DATA_INVALID);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_reported() {
        let args = send_args(&["--binary", "/nonexistent/killalot.bin"]);
        assert_eq!(resolve_payload(&args).unwrap_err().code, crate::exit::FAILURE);
    }
}
