//! A computing party (or trusted dealer) of a secure multi-party dot product over TCP.
use std::{fmt, process::ExitCode};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use polyshare::{
    Error, error::ConfigError, preprocessing::Preprocessor, protocol::Protocol,
    setup::SetupParams,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use crate::{channel::TcpChannel, cli::Cli};

mod channel;
mod cli;

/// Why a run did not produce a result, determining the exit code.
#[derive(Debug)]
enum Failure {
    /// The protocol name is unknown, the usage is printed.
    Usage(ConfigError),
    /// The network configuration is invalid.
    Config(anyhow::Error),
    /// The mesh of connections could not be established.
    Connect(anyhow::Error),
    /// The computation itself failed.
    Computation(Error),
}

impl Failure {
    fn exit_code(&self) -> ExitCode {
        let code = match self {
            Failure::Usage(_) | Failure::Config(_) => 1,
            Failure::Connect(_) => 2,
            Failure::Computation(e) => match e {
                Error::Configuration(_) => 1,
                Error::Network(_) => 2,
                Error::Integrity(_) => 3,
                Error::Protocol(_) | Error::PreprocessingExhausted { .. } => 4,
            },
        };
        ExitCode::from(code)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Usage(e) => write!(f, "{e}"),
            Failure::Config(e) => write!(f, "configuration error: {e:#}"),
            Failure::Connect(e) => write!(f, "network failure: {e:#}"),
            Failure::Computation(e) => write!(f, "{e}"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if let Err(e) = init_tracing().context("tracing initialization") {
        eprintln!("{e:#}");
        return ExitCode::from(4);
    }

    match run(&cli).await {
        Ok(Some(result)) => {
            println!("result: {result}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("{failure}");
            if let Failure::Usage(_) = failure {
                let names: Vec<&str> = Protocol::ALL.iter().map(|p| p.name()).collect();
                eprintln!("{}", Cli::command().render_usage());
                eprintln!("supported protocols: {}", names.join(", "));
            }
            failure.exit_code()
        }
    }
}

/// Runs the party (returning the verified result) or the dealer (returning `None`).
async fn run(cli: &Cli) -> Result<Option<u128>, Failure> {
    let protocol: Protocol = cli.protocol_name.parse().map_err(Failure::Usage)?;
    let preprocessor = cli.preprocessor().map_err(Failure::Config)?;
    let params = SetupParams {
        party: cli.my_index,
        parties: cli.total_parties,
        threshold: cli.threshold,
    };
    // the dealer checks the computation it serves from the point of view of party 0
    let checked = if cli.is_dealer() {
        SetupParams { party: 0, ..params }
    } else {
        params
    };
    protocol
        .validate(&checked, preprocessor)
        .map_err(|e| Failure::Computation(e.into()))?;
    let endpoints = cli.endpoints().map_err(Failure::Config)?;
    let inputs = cli.inputs();

    let channel = TcpChannel::connect(cli.my_index, &endpoints, cli.timeout())
        .await
        .context("could not connect to all peers")
        .map_err(Failure::Connect)?;

    if cli.is_dealer() {
        info!(parties = cli.total_parties, %protocol, "running trusted dealer");
        protocol
            .dealer(&channel, cli.total_parties, cli.threshold, cli.triple_budget)
            .await
            .map_err(Failure::Computation)?;
        info!("trusted dealer finished");
        return Ok(None);
    }
    if preprocessor == Preprocessor::SharedSeed {
        warn!("preprocessing from a shared seed reveals all shares, use a trusted dealer");
    }
    info!(party = cli.my_index, %protocol, inputs = inputs.len(), "computing dot product");
    let result = protocol
        .dot_product(&channel, params, preprocessor, &inputs)
        .await
        .map_err(Failure::Computation)?;
    Ok(Some(result))
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_env_var("POLYSHARE_LOG")
        .with_default_directive("polyshare=info".parse()?)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
