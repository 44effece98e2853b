use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use cli::{Args, Report};
use dns_client::UdpTransport;
use dns_record::{RecordType, ResourceRecord};
use dns_resolver::Resolver;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod cli;
mod dns_client;
mod dns_hdr;
mod dns_record;
mod dns_resolver;
mod root_hints;

fn main() -> ExitCode {
    let args = match Args::from_env() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    init_tracing(args.log_level());

    let qtype = match args.record_type.parse::<RecordType>() {
        Ok(qtype) => qtype,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    Report::new(&args.name, resolve(&args, qtype)).emit()
}

fn resolve(args: &Args, qtype: RecordType) -> Result<Vec<ResourceRecord>> {
    let transport = UdpTransport::new(args.port, args.timeout());
    let config = args.resolver_config();

    let records = match args.seed {
        Some(seed) => Resolver::with_config(transport, StdRng::seed_from_u64(seed), config)
            .resolve(&args.name, qtype),
        None => Resolver::with_config(transport, rand::thread_rng(), config)
            .resolve(&args.name, qtype),
    }
    .with_context(|| format!("resolving {} {qtype}", args.name))?;

    Ok(records)
}

/// Logs go to stderr so stdout only carries records.
fn init_tracing(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
