use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use fwpush_core::{ErrorKind, LastWillConfig, PushError, PushSession, SessionConfig};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Sign a firmware image and publish it over MQTT",
    long_about = None,
    disable_help_flag = true
)]
struct Args {
    /// Firmware file to publish
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Broker host
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Broker port (default 1883, or 8883 with TLS)
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Enable TLS
    #[arg(short = 't', long)]
    tls: bool,

    /// CA certificate file (PEM) for TLS
    #[arg(short = 'c', long = "ca-file")]
    ca_file: Option<PathBuf>,

    /// QoS level
    #[arg(short = 'q', long, value_parser = clap::value_parser!(u8).range(0..=2))]
    qos: Option<u8>,

    /// Disable clean session
    #[arg(short = 's', long = "no-clean-session")]
    no_clean_session: bool,

    /// Keep alive seconds
    #[arg(short = 'k', long = "keep-alive")]
    keep_alive: Option<u16>,

    /// Client id
    #[arg(short = 'i', long = "client-id")]
    client_id: Option<String>,

    /// Enable last will
    #[arg(short = 'l', long = "last-will")]
    last_will: bool,

    /// Username
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Password
    #[arg(short = 'w', long)]
    password: Option<String>,

    /// Publish topic
    #[arg(long)]
    topic: Option<String>,

    /// Load settings from a TOML file; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print help
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

impl Args {
    fn into_config(self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(file) = self.file {
            config.firmware_path = file;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.tls {
            config.tls = true;
        }
        if self.ca_file.is_some() {
            config.ca_file = self.ca_file;
        }
        if let Some(qos) = self.qos {
            config.qos = qos;
        }
        if self.no_clean_session {
            config.clean_session = false;
        }
        if let Some(secs) = self.keep_alive {
            config.keep_alive_sec = secs;
        }
        if let Some(id) = self.client_id {
            config.client_id = id;
        }
        if self.last_will && config.last_will.is_none() {
            config.last_will = Some(LastWillConfig::default());
        }
        if self.username.is_some() {
            config.username = self.username;
        }
        if self.password.is_some() {
            config.password = self.password;
        }
        if let Some(topic) = self.topic {
            config.topic = topic;
        }
        Ok(config)
    }
}

fn run(args: Args) -> Result<i32> {
    let config = args.into_config()?;
    let session = PushSession::new(config);
    let config = session.config();
    info!(
        firmware = %config.firmware_path.display(),
        host = %config.host,
        port = config.effective_port(),
        topic = %config.topic,
        "Starting push"
    );

    let stop = session.stop_flag();
    ctrlc::set_handler(move || stop.request_stop()).context("installing Ctrl-C handler")?;

    let report = session.run_tcp()?;
    if let Some(failure) = report.first_failure() {
        let kind = ErrorKind::from_status_code(failure.code).unwrap_or(ErrorKind::Network);
        error!(
            step = %failure.step,
            code = failure.code,
            kind = %kind,
            "{}",
            failure.message
        );
    }
    if report.interrupted {
        warn!("Interrupted before the firmware was published");
    }
    Ok(report.exit_code())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting fwpush...");

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("Error: {:#}", e);
            e.downcast_ref::<PushError>()
                .map_or(ErrorKind::Input.exit_code(), PushError::exit_code)
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_map_to_config() {
        let args = Args::try_parse_from([
            "fwpush", "-f", "fw.bin", "-h", "broker", "-p", "8884", "-t", "-q", "1", "-s", "-k",
            "30", "-i", "dev", "-l", "-u", "user", "-w", "pass",
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.firmware_path, PathBuf::from("fw.bin"));
        assert_eq!(config.host, "broker");
        assert_eq!(config.port, 8884);
        assert!(config.tls);
        assert_eq!(config.qos, 1);
        assert!(!config.clean_session);
        assert_eq!(config.keep_alive_sec, 30);
        assert_eq!(config.client_id, "dev");
        assert!(config.last_will.is_some());
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.password.as_deref(), Some("pass"));
    }

    #[test]
    fn test_defaults_when_no_flags() {
        let config = Args::try_parse_from(["fwpush"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range_numbers() {
        for argv in [
            ["fwpush", "-p", "0"],
            ["fwpush", "-q", "3"],
            ["fwpush", "-p", "70000"],
        ] {
            let err = Args::try_parse_from(argv).unwrap_err();
            assert_eq!(err.exit_code(), 2);
        }
    }

    #[test]
    fn test_question_mark_prints_help() {
        let err = Args::try_parse_from(["fwpush", "-?"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
