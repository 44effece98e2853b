use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, Level};

use crate::dns_record::ResourceRecord;
use crate::dns_resolver::{ResolverConfig, DEFAULT_MAX_DEPTH};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Domain name to resolve
    pub name: String,

    /// Record type to ask for: A, AAAA, CNAME or SOA
    pub record_type: String,

    /// Seconds to wait for each nameserver to answer
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Port nameservers are queried on
    #[arg(long, default_value_t = 53)]
    pub port: u16,

    /// CNAME chases plus nameserver address lookups allowed per resolution
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Seed for picking root servers, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log more, repeat for more detail (RUST_LOG overrides)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse()
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_depth: self.max_depth,
            ..ResolverConfig::default()
        }
    }
}

/// What a finished resolution prints, and where.
#[derive(Debug, PartialEq, Eq)]
pub enum Report {
    /// One line per record on stdout.
    Records(Vec<String>),
    /// A single line on stderr.
    Failure(String),
}

impl Report {
    pub fn new(name: &str, result: anyhow::Result<Vec<ResourceRecord>>) -> Self {
        match result {
            Ok(records) => Report::Records(records.iter().map(ToString::to_string).collect()),
            Err(e) => {
                debug!("{e:#}");
                Report::Failure(format!("Failed to resolve {name}"))
            }
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Report::Records(_) => 0,
            Report::Failure(_) => 1,
        }
    }

    pub fn emit(&self) -> ExitCode {
        match self {
            Report::Records(lines) => lines.iter().for_each(|line| println!("{line}")),
            Report::Failure(message) => eprintln!("{message}"),
        }
        ExitCode::from(self.code())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use clap::error::ErrorKind;

    use super::*;
    use crate::dns_resolver::ResolveError;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["dns-walk", "example.com", "A"]).unwrap();

        assert_eq!(args.name, "example.com");
        assert_eq!(args.record_type, "A");
        assert_eq!(args.timeout(), Duration::from_secs(5));
        assert_eq!(args.port, 53);
        assert_eq!(args.seed, None);
        assert_eq!(args.log_level(), Level::WARN);
        assert_eq!(args.resolver_config().max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_options() {
        let args = Args::try_parse_from([
            "dns-walk",
            "-vv",
            "--seed",
            "7",
            "--max-depth",
            "5",
            "--timeout",
            "1",
            "example.com",
            "AAAA",
        ])
        .unwrap();

        assert_eq!(args.seed, Some(7));
        assert_eq!(args.log_level(), Level::DEBUG);
        assert_eq!(args.resolver_config().max_depth, 5);
        assert_eq!(args.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_wrong_argument_count() {
        let err = Args::try_parse_from(["dns-walk", "example.com"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let err = Args::try_parse_from(["dns-walk", "example.com", "A", "extra"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Args::try_parse_from(["dns-walk", "--timeout", "0", "example.com", "A"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_report_records() {
        let records = vec![ResourceRecord::A {
            name: "example.com.".to_string(),
            ttl: 300,
            addr: Ipv4Addr::new(93, 184, 216, 34),
        }];
        let report = Report::new("example.com", Ok(records));

        assert_eq!(
            report,
            Report::Records(vec!["example.com.\t300\tIN\tA\t93.184.216.34".to_string()])
        );
        assert_eq!(report.code(), 0);
    }

    #[test]
    fn test_report_failure() {
        let result = Err(anyhow::Error::new(ResolveError::BrokenChain).context("resolving x A"));
        let report = Report::new("www.example.com", result);

        assert_eq!(
            report,
            Report::Failure("Failed to resolve www.example.com".to_string())
        );
        assert_eq!(report.code(), 1);
    }
}
