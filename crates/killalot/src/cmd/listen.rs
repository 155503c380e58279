use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;

use bytes::Bytes;
use killalot_link::{LinkConfig, LinkError, LinkListener, TransportManager};
use killalot_protocol::{Bitmap, DecodeEvent, DecodeListener, ProtocolError, RequestKind};
use tracing::{info, warn};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{link_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

enum Incoming {
    Event(DecodeEvent),
    Closed,
}

/// Forwards everything the read pump decodes to the printing thread.
struct Forwarder {
    events: Sender<Incoming>,
}

impl Forwarder {
    fn forward(&self, event: DecodeEvent) {
        let _ = self.events.send(Incoming::Event(event));
    }
}

impl DecodeListener for Forwarder {
    fn on_recv_channels(&mut self, start: u16, values: [u8; 8]) {
        self.forward(DecodeEvent::Message(
            killalot_protocol::DecodedMessage::Channels { start, values },
        ));
    }

    fn on_recv_command(&mut self, command: String) {
        self.forward(DecodeEvent::Message(
            killalot_protocol::DecodedMessage::Command(command),
        ));
    }

    fn on_recv_bitmap(&mut self, bitmap: Bitmap) {
        self.forward(DecodeEvent::Message(
            killalot_protocol::DecodedMessage::Image(bitmap),
        ));
    }

    fn on_recv_binary(&mut self, data: Bytes) {
        self.forward(DecodeEvent::Message(
            killalot_protocol::DecodedMessage::Binary(data),
        ));
    }

    fn on_request(&mut self, kind: RequestKind, code: u8) {
        self.forward(DecodeEvent::Request { kind, code });
    }

    fn on_error(&mut self, error: ProtocolError) {
        self.forward(DecodeEvent::Error(error));
    }

    fn on_heartbeat(&mut self) {
        self.forward(DecodeEvent::Heartbeat);
    }
}

impl LinkListener for Forwarder {
    fn on_link_error(&mut self, error: LinkError) {
        if !matches!(error, LinkError::Disconnected) {
            warn!(%error, "link failed");
        }
    }

    fn on_disconnect(&mut self) {
        let _ = self.events.send(Incoming::Closed);
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let poll_interval = parse_duration(&args.poll_interval)?;
    let acceptor = args
        .addr
        .bind()
        .map_err(|err| transport_error("bind failed", err))?;
    info!(addr = %args.addr, "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let transport = acceptor
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        let peer = transport.peer_label();
        info!(%peer, "peer connected");

        let (events, incoming) = mpsc::channel();
        let config = LinkConfig {
            poll_interval,
            auto_drain: false,
            receive_limit: args.max_message,
            ..LinkConfig::default()
        };
        let manager = TransportManager::new(Forwarder { events }, config);
        manager
            .attach(Box::new(transport))
            .map_err(|err| link_error("attach failed", err))?;

        while running.load(Ordering::SeqCst) {
            match incoming.recv_timeout(poll_interval) {
                Ok(Incoming::Event(event)) => {
                    print_event(&event, &peer, format);
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        manager.disconnect(None);
                        return Ok(SUCCESS);
                    }
                }
                Ok(Incoming::Closed) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        manager.disconnect(None);
        info!(%peer, "peer disconnected");
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
