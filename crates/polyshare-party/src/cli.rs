//! Command line arguments of a party.

use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use polyshare::preprocessing::Preprocessor;

/// The number of input values every party contributes if no `--inputs` are given.
const DEFAULT_INPUT_LEN: u128 = 1000;

/// A computing party of a secure multi-party dot product.
///
/// Party 0 contributes the first vector, party 1 the second one, and every party learns their dot
/// product once it has been verified. Supported protocols are MASCOT, CowGear, SPDZ2k, Semi,
/// Semi2k, Shamir and MalShamir.
///
/// Logging can be controlled with an EnvFilter via the `POLYSHARE_LOG` environment variable.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// The own party index (or the index of the trusted dealer, to run the dealer).
    pub my_index: usize,
    /// The number of computing parties.
    pub total_parties: usize,
    /// The secret-sharing backend.
    #[arg(default_value = "MASCOT")]
    pub protocol_name: String,
    /// The threshold of Shamir-based backends, `(total_parties - 1) / 2` by default.
    pub threshold: Option<usize>,
    /// Party `i` listens on port `port_base + i`.
    #[arg(long, default_value_t = 9999)]
    pub port_base: u16,
    /// Comma-separated hosts of all parties by index (including a trusted dealer).
    ///
    /// All parties run on the loopback interface if no hosts are given.
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,
    /// Comma-separated private input values, `0,1,...,999` by default.
    #[arg(long, value_delimiter = ',')]
    pub inputs: Option<Vec<u128>>,
    /// Index of a trusted dealer providing the preprocessed material (at least `total_parties`).
    #[arg(long)]
    pub trusted_dealer: Option<usize>,
    /// Derive the preprocessed material from a jointly tossed seed instead of using a dealer.
    ///
    /// Every party learns all shares and the MAC key, so this is only meant for testing.
    #[arg(long, conflicts_with = "trusted_dealer")]
    pub insecure_shared_seed: bool,
    /// The maximum number of triples the trusted dealer hands out to each party.
    #[arg(long, requires = "trusted_dealer")]
    pub triple_budget: Option<usize>,
    /// Seconds to wait for peers to connect and for each message.
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,
}

impl Cli {
    /// Whether this process runs the trusted dealer instead of a computing party.
    pub fn is_dealer(&self) -> bool {
        self.trusted_dealer == Some(self.my_index)
    }

    /// The configured source of preprocessed material.
    pub fn preprocessor(&self) -> anyhow::Result<Preprocessor> {
        match self.trusted_dealer {
            Some(dealer) => Ok(Preprocessor::TrustedDealer(dealer)),
            None if self.insecure_shared_seed => Ok(Preprocessor::SharedSeed),
            None => bail!("no --trusted-dealer given (or --insecure-shared-seed for testing)"),
        }
    }

    /// The private inputs of this party.
    pub fn inputs(&self) -> Vec<u128> {
        match &self.inputs {
            Some(inputs) => inputs.clone(),
            None => (0..DEFAULT_INPUT_LEN).collect(),
        }
    }

    /// How long to wait for peers and messages.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The `host:port` of every party (and the dealer) taking part, indexed by party.
    pub fn endpoints(&self) -> anyhow::Result<Vec<Option<String>>> {
        let len = match self.trusted_dealer {
            Some(dealer) => dealer + 1,
            None => self.total_parties,
        };
        let mut endpoints = Vec::with_capacity(len);
        for p in 0..len {
            if p >= self.total_parties && Some(p) != self.trusted_dealer {
                endpoints.push(None);
                continue;
            }
            let host = if self.hosts.is_empty() {
                "127.0.0.1"
            } else {
                match self.hosts.get(p) {
                    Some(host) => host.as_str(),
                    None => bail!("no host given for party {p}"),
                }
            };
            let port = u16::try_from(p)
                .ok()
                .and_then(|p| self.port_base.checked_add(p))
                .with_context(|| format!("port of party {p} exceeds the port range"))?;
            endpoints.push(Some(format!("{host}:{port}")));
        }
        Ok(endpoints)
    }
}
