use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use killalot_protocol::PixelEncoding;
use killalot_transport::{Connector, StreamTransport, TcpAcceptor, TcpConnector};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod dump;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and send a single transaction.
    Send(SendArgs),
    /// Accept connections and print decoded messages.
    Listen(ListenArgs),
    /// Decode a captured byte stream.
    Dump(DumpArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Dump(args) => dump::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Peer address: HOST:PORT, tcp://HOST:PORT or unix:PATH.
    pub addr: Endpoint,
    /// Transaction name.
    #[arg(long, default_value = "cli")]
    pub name: String,
    /// Terminal command text.
    #[arg(
        long,
        conflicts_with_all = ["channels", "binary", "image"],
        required_unless_present_any = ["channels", "binary", "image"]
    )]
    pub command: Option<String>,
    /// Channel values (comma-separated, 0-255).
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["command", "binary", "image"])]
    pub channels: Option<Vec<u8>>,
    /// Send a file as a binary transfer.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["command", "channels", "image"])]
    pub binary: Option<PathBuf>,
    /// Send raw pixel data from a file as an image.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["command", "channels", "binary"],
        requires_all = ["width", "height"]
    )]
    pub image: Option<PathBuf>,
    /// Image width in pixels.
    #[arg(long, requires = "image")]
    pub width: Option<u16>,
    /// Image height in pixels.
    #[arg(long, requires = "image")]
    pub height: Option<u16>,
    /// Pixel encoding of the --image file.
    #[arg(long, value_enum, default_value = "argb8888")]
    pub encoding: EncodingArg,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to bind: HOST:PORT, tcp://HOST:PORT or unix:PATH.
    pub addr: Endpoint,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
    /// Idle wait between reads (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub poll_interval: String,
    /// Reject images and binaries larger than this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_message: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Capture file. Reads stdin when omitted.
    pub file: Option<PathBuf>,
    /// Print decoded messages instead of datagrams.
    #[arg(long)]
    pub messages: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum EncodingArg {
    Rgb565,
    Argb8888,
}

impl From<EncodingArg> for PixelEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Rgb565 => PixelEncoding::Rgb565,
            EncodingArg::Argb8888 => PixelEncoding::Argb8888,
        }
    }
}

/// A place to connect to or listen on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            let path = path.trim_start_matches("//");
            if path.is_empty() {
                return Err("unix endpoint needs a path".to_string());
            }
            #[cfg(unix)]
            return Ok(Endpoint::Unix(PathBuf::from(path)));
            #[cfg(not(unix))]
            return Err("unix sockets are not supported on this platform".to_string());
        }

        let addr = s.strip_prefix("tcp://").unwrap_or(s);
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            _ => Err(format!("expected HOST:PORT or unix:PATH, got {s:?}")),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl Endpoint {
    pub fn connector(&self, timeout: Duration) -> Box<dyn Connector> {
        match self {
            Endpoint::Tcp(addr) => Box::new(TcpConnector::new(addr.clone()).with_timeout(timeout)),
            #[cfg(unix)]
            Endpoint::Unix(path) => Box::new(killalot_transport::UnixConnector::new(path.clone())),
        }
    }

    pub fn bind(&self) -> killalot_transport::Result<Acceptor> {
        match self {
            Endpoint::Tcp(addr) => TcpAcceptor::bind(addr.as_str()).map(Acceptor::Tcp),
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                killalot_transport::UnixDomainSocket::bind(path).map(Acceptor::Unix)
            }
        }
    }
}

pub enum Acceptor {
    Tcp(TcpAcceptor),
    #[cfg(unix)]
    Unix(killalot_transport::UnixDomainSocket),
}

impl Acceptor {
    pub fn accept(&self) -> killalot_transport::Result<StreamTransport> {
        match self {
            Acceptor::Tcp(acceptor) => acceptor.accept(),
            #[cfg(unix)]
            Acceptor::Unix(socket) => socket.accept(),
        }
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
