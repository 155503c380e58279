mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "killalot", version, about = "Killalot protocol CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "killalot",
            "send",
            "127.0.0.1:9000",
            "--channels",
            "1,2,3",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "killalot",
            "send",
            "127.0.0.1:9000",
            "--command",
            "go",
            "--channels",
            "1",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn send_requires_a_payload() {
        let err = Cli::try_parse_from(["killalot", "send", "127.0.0.1:9000"])
            .expect_err("missing payload should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn rejects_bad_address() {
        let err = Cli::try_parse_from(["killalot", "listen", "nowhere"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_dump_from_stdin() {
        let cli = Cli::try_parse_from(["killalot", "--format", "json", "dump", "--messages"])
            .expect("dump args should parse");
        assert!(matches!(
            cli.command,
            Command::Dump(ref args) if args.file.is_none() && args.messages
        ));
    }

    #[test]
    fn parses_listen_receive_limit() {
        let cli = Cli::try_parse_from([
            "killalot",
            "listen",
            "127.0.0.1:9000",
            "--max-message",
            "4096",
        ])
        .expect("listen args should parse");
        assert!(matches!(
            cli.command,
            Command::Listen(ref args) if args.max_message == Some(4096)
        ));
    }
}
