use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use killalot_frame::{indicator_name, Datagram};
use killalot_protocol::{DecodeEvent, DecodedMessage, PixelEncoding, RequestKind};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Flattened view of a decode event, shared by every format.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct EventOutput {
    pub kind: &'static str,
    pub size: usize,
    pub content: String,
    pub peer: String,
    pub timestamp: String,
}

impl EventOutput {
    pub fn new(event: &DecodeEvent, peer: &str) -> Self {
        let (kind, size, content) = match event {
            DecodeEvent::Message(DecodedMessage::Channels { start, values }) => (
                "channels",
                values.len(),
                format!("start={start} values={values:?}"),
            ),
            DecodeEvent::Message(DecodedMessage::Command(text)) => {
                ("command", text.len(), text.clone())
            }
            DecodeEvent::Message(DecodedMessage::Image(bitmap)) => (
                "image",
                bitmap.byte_len(),
                format!(
                    "{}x{} {}",
                    bitmap.width(),
                    bitmap.height(),
                    encoding_name(bitmap.encoding())
                ),
            ),
            DecodeEvent::Message(DecodedMessage::Binary(data)) => {
                ("binary", data.len(), hex_preview(data))
            }
            DecodeEvent::Heartbeat => ("heartbeat", 0, String::new()),
            DecodeEvent::Request { kind, code } => {
                ("request", 0, format!("{} code={code}", request_name(*kind)))
            }
            DecodeEvent::Error(err) => ("error", 0, err.to_string()),
        };
        Self {
            kind,
            size,
            content,
            peer: peer.to_string(),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_event(event: &DecodeEvent, peer: &str, format: OutputFormat) {
    if let OutputFormat::Raw = format {
        match event {
            DecodeEvent::Message(DecodedMessage::Command(text)) => print_raw(text.as_bytes()),
            DecodeEvent::Message(DecodedMessage::Image(bitmap)) => print_raw(bitmap.data()),
            DecodeEvent::Message(DecodedMessage::Binary(data)) => print_raw(data),
            DecodeEvent::Message(DecodedMessage::Channels { values, .. }) => print_raw(values),
            _ => {}
        }
        return;
    }

    let out = EventOutput::new(event, peer);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            &["KIND", "SIZE", "PEER", "CONTENT"],
            vec![vec![
                out.kind.to_string(),
                out.size.to_string(),
                out.peer,
                out.content,
            ]],
        ),
        OutputFormat::Pretty => println!(
            "{} size={} peer={} {}",
            out.kind, out.size, out.peer, out.content
        ),
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct DatagramOutput {
    index: usize,
    indicator: u8,
    name: &'static str,
    header: String,
    payload: String,
}

/// Print datagrams recovered from a capture.
pub fn print_datagrams(datagrams: &[Datagram], format: OutputFormat) {
    let rows = datagrams.iter().enumerate().map(|(index, d)| DatagramOutput {
        index,
        indicator: d.indicator(),
        name: indicator_name(d.indicator()),
        header: hex(&d.header),
        payload: hex(&d.payload),
    });

    match format {
        OutputFormat::Json => rows.for_each(|row| print_json(&row)),
        OutputFormat::Table => print_table(
            &["#", "INDICATOR", "HEADER", "PAYLOAD"],
            rows.map(|row| {
                vec![
                    row.index.to_string(),
                    format!("{} ({})", row.name, row.indicator),
                    row.header,
                    row.payload,
                ]
            })
            .collect(),
        ),
        OutputFormat::Pretty => rows.for_each(|row| {
            println!("#{} {:<10} {} | {}", row.index, row.name, row.header, row.payload)
        }),
        OutputFormat::Raw => datagrams.iter().for_each(|d| print_raw(&d.to_bytes())),
    }
}

/// Summary of a queued and flushed transaction.
#[derive(Serialize, Debug)]
pub struct SendReport {
    pub name: String,
    pub kind: &'static str,
    pub frames: usize,
    pub bytes: usize,
    pub peer: String,
}

pub fn print_send_report(report: &SendReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => print_table(
            &["NAME", "KIND", "FRAMES", "BYTES", "PEER"],
            vec![vec![
                report.name.clone(),
                report.kind.to_string(),
                report.frames.to_string(),
                report.bytes.to_string(),
                report.peer.clone(),
            ]],
        ),
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "sent {} ({}) frames={} bytes={} peer={}",
            report.name, report.kind, report.frames, report.bytes, report.peer
        ),
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn encoding_name(encoding: PixelEncoding) -> &'static str {
    match encoding {
        PixelEncoding::Rgb565 => "rgb565",
        PixelEncoding::Argb8888 => "argb8888",
    }
}

fn request_name(kind: RequestKind) -> String {
    match kind {
        RequestKind::Stop => "stop".to_string(),
        RequestKind::Resend => "resend".to_string(),
        RequestKind::Unknown(kind) => format!("unknown({kind})"),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn hex_preview(data: &[u8]) -> String {
    const PREVIEW: usize = 16;
    if data.len() <= PREVIEW {
        hex(data)
    } else {
        format!("{} ...", hex(&data[..PREVIEW]))
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use killalot_protocol::ProtocolError;

    use super::*;

    #[test]
    fn events_flatten_for_output() {
        let command = EventOutput::new(
            &DecodeEvent::Message(DecodedMessage::Command("fire".into())),
            "tcp",
        );
        assert_eq!((command.kind, command.size), ("command", 4));
        assert_eq!(command.content, "fire");

        let binary = EventOutput::new(
            &DecodeEvent::Message(DecodedMessage::Binary(Bytes::from(vec![0xAB; 20]))),
            "tcp",
        );
        assert_eq!(binary.size, 20);
        assert!(binary.content.starts_with("ab ab"));
        assert!(binary.content.ends_with("..."));

        let request = EventOutput::new(
            &DecodeEvent::Request {
                kind: RequestKind::Resend,
                code: 2,
            },
            "tcp",
        );
        assert_eq!(request.content, "resend code=2");

        let unknown = DecodeEvent::Error(ProtocolError::UnknownIndicator(99));
        let error = EventOutput::new(&unknown, "tcp");
        assert_eq!(error.kind, "error");
        assert!(error.content.contains("99"));
    }

    #[test]
    fn hex_is_space_separated() {
        assert_eq!(hex(&[0x0b, 0x00, 0xc0]), "0b 00 c0");
        assert_eq!(hex(&[]), "");
    }
}
