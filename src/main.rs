//! packetlog Server Binary
//!
//! Shared packet journal over TCP.

use clap::error::ErrorKind;
use clap::Parser;
use packetlog::config::{ConnectionMode, ServerConfig};
use packetlog::server::{LogServer, LogStore, ShutdownController};
use packetlog::{daemon, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "config/server.toml";

#[derive(Parser, Debug, Default)]
#[command(name = "packetlog-server")]
#[command(about = "Shared append-only packet journal served over TCP")]
#[command(version)]
struct Args {
    /// Run as a daemon
    #[arg(short = 'd')]
    daemon: bool,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Journal file path
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Handle one connection at a time
    #[arg(long)]
    serial: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Parse arguments; anything clap rejects is ignored rather than fatal.
fn parse_args() -> (Args, Option<clap::Error>) {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    match parse_args_from(&argv) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    }
}

/// Only help and version requests come back as `Err`. On any other parse
/// error the defaults are used, with daemon mode set when `-d` is the sole
/// argument.
fn parse_args_from(argv: &[String]) -> Result<(Args, Option<clap::Error>), clap::Error> {
    let full = std::iter::once("packetlog-server").chain(argv.iter().map(String::as_str));
    match Args::try_parse_from(full) {
        Ok(args) => Ok((args, None)),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => Err(e),
        Err(e) => {
            let args = Args {
                daemon: argv.len() == 1 && argv[0] == "-d",
                config: PathBuf::from(DEFAULT_CONFIG),
                ..Default::default()
            };
            Ok((args, Some(e)))
        }
    }
}

fn load_config(args: &Args) -> packetlog::Result<ServerConfig> {
    let file = args.config.exists().then_some(args.config.as_path());
    let mut config = ServerConfig::load(file)?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_file) = &args.data_file {
        config.storage.data_file = data_file.clone();
    }
    if args.serial {
        config.server.connection_mode = ConnectionMode::Serial;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let (args, parse_error) = parse_args();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging, args.verbose) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting packetlog server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = parse_error {
        warn!(kind = ?e.kind(), "Ignoring unrecognized arguments");
    }

    if args.daemon {
        info!("Running as daemon");
        if let Err(e) = daemon::daemonize() {
            error!(error = %e, "Failed to daemonize");
            return ExitCode::FAILURE;
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    exit_code(runtime.block_on(serve(config)))
}

fn exit_code(result: packetlog::Result<()>) -> ExitCode {
    match result {
        Ok(()) => {
            info!("packetlog server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "packetlog server failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: ServerConfig) -> packetlog::Result<()> {
    let shutdown = ShutdownController::new();
    shutdown.listen_for_signals()?;

    let server = match LogServer::with_shutdown(config.clone(), shutdown).await {
        Ok(server) => server,
        Err(e) => {
            if config.storage.remove_on_shutdown {
                if let Err(remove_err) = LogStore::new(&config).remove().await {
                    warn!(error = %remove_err, "Failed to remove journal");
                }
            }
            return Err(e);
        }
    };
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use packetlog::PacketLogError;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_sole_daemon_flag() {
        let (args, error) = parse_args_from(&argv(&["-d"])).unwrap();
        assert!(args.daemon);
        assert!(error.is_none());
    }

    #[test]
    fn test_daemon_flag_with_unknown_argument_is_ignored() {
        let (args, error) = parse_args_from(&argv(&["-d", "x"])).unwrap();
        assert!(!args.daemon);
        assert!(error.is_some());
    }

    #[test]
    fn test_unknown_argument_falls_back_to_defaults() {
        let (args, error) = parse_args_from(&argv(&["bogus"])).unwrap();
        assert_eq!(
            error.map(|e| e.kind()),
            Some(ErrorKind::UnknownArgument)
        );
        assert!(!args.daemon);
        assert!(!args.serial);
        assert!(!args.verbose);
        assert_eq!(args.port, None);
        assert_eq!(args.data_file, None);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG));
    }

    #[test]
    fn test_overrides_are_parsed() {
        let (args, error) =
            parse_args_from(&argv(&["-p", "9100", "--data-file", "/tmp/j", "--serial"])).unwrap();
        assert!(error.is_none());
        assert_eq!(args.port, Some(9100));
        assert_eq!(args.data_file, Some(PathBuf::from("/tmp/j")));
        assert!(args.serial);
        assert!(!args.daemon);
    }

    #[test]
    fn test_help_is_not_swallowed() {
        let err = parse_args_from(&argv(&["--help"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(Ok(())), ExitCode::SUCCESS);
        assert_eq!(
            exit_code(Err(PacketLogError::Storage("disk full".to_string()))),
            ExitCode::FAILURE
        );
    }

    fn conflicting_config(data_file: PathBuf, port: u16) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = port;
        config.storage.data_file = data_file;
        config.logging.syslog.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_bind_failure_removes_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let data_file = temp_dir.path().join("journal");
        std::fs::write(&data_file, b"stale\n").unwrap();

        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = serve(conflicting_config(data_file.clone(), port)).await;
        assert!(matches!(result, Err(PacketLogError::Server(_))));
        assert!(!data_file.exists());
    }

    #[tokio::test]
    async fn test_failed_removal_keeps_bind_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        // A non-empty directory cannot be removed as a file
        let data_file = temp_dir.path().join("journal");
        std::fs::create_dir(&data_file).unwrap();
        std::fs::write(data_file.join("inner"), b"x").unwrap();

        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = serve(conflicting_config(data_file.clone(), port)).await;
        assert!(matches!(result, Err(PacketLogError::Server(_))));
        assert!(data_file.is_dir());
    }
}
