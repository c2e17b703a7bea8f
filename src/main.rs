//! Command-line SPF checker.
//!
//! Checks whether an address may send mail for a domain (or the domain of an
//! e-mail address) and prints which SPF directive decided it.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use spf_trail::common::dns::HickoryResolver;
use spf_trail::common::domain::sender_domain;
use spf_trail::config::Config;
use spf_trail::logging;
use spf_trail::report::Report;
use spf_trail::spf::SpfChecker;

/// EX_TEMPFAIL from sysexits.h.
const EXIT_TEMPFAIL: u8 = 75;

/// Check whether an address is authorized by a domain's SPF policy
#[derive(Parser, Debug)]
#[command(name = "spf-trail")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (resolver and log settings)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by SPF_TRAIL_LOG)
    #[arg(short, long)]
    verbose: bool,

    /// Address of the sending host
    ip: IpAddr,

    /// Domain to check, or an e-mail address whose domain is checked
    sender: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let Some(domain) = sender_domain(&cli.sender) else {
        Cli::command()
            .error(
                ErrorKind::ValueValidation,
                format!("'{}' is neither a domain name nor an e-mail address", cli.sender),
            )
            .exit();
    };

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let level = if cli.verbose { "debug" } else { config.log.level.as_str() };
    logging::init(logging::level(level));

    let resolver = HickoryResolver::from_settings(&config.resolver)
        .context("failed to initialise DNS resolver")?;
    let check = SpfChecker::new(resolver).check(cli.ip, &domain).await;

    if check.top_fetch_failed() {
        eprintln!("temperror: could not retrieve the SPF record of {domain}, try again later");
        return Ok(ExitCode::from(EXIT_TEMPFAIL));
    }

    print!("{}", Report::new(&check, cli.ip));
    Ok(ExitCode::SUCCESS)
}
