//! Backend selection and the dot product computation.
//!
//! The main entry point is [`Protocol::dot_product`], which should be called by every computing
//! party with its private inputs. Party 0 contributes the first vector, party 1 the second one,
//! and every party learns the dot product once all opened values have been verified.

use std::{fmt, str::FromStr};

use futures::future::{try_join, try_join_all};
use tracing::{Level, info, instrument};

use crate::{
    channel::{Channel, SimpleChannel},
    dealer::dealer,
    error::{ConfigError, Error},
    field::{Field, Gf61, Gf127, Ring, Z2k},
    input::InputProtocol,
    mul::DotProdProtocol,
    output::OpenProtocol,
    preprocessing::Preprocessor,
    setup::{ProtocolSetup, SetupParams},
    sharing::{Additive, AdditiveMac, MalShamir, Scheme, SemiShamir},
};

/// The supported secret-sharing backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Additive sharing with MACs over the 127-bit Mersenne prime field.
    #[default]
    Mascot,
    /// Additive sharing with MACs over the 61-bit Mersenne prime field.
    CowGear,
    /// Additive sharing with MACs over `Z/2^128`, computing on the low 64 bits.
    Spdz2k,
    /// Additive sharing without MACs, secure against semi-honest parties only.
    Semi,
    /// Additive sharing without MACs over `Z/2^64`.
    Semi2k,
    /// Shamir sharing for an honest majority of semi-honest parties.
    Shamir,
    /// Shamir sharing for an honest majority, detecting inconsistent openings.
    MalShamir,
}

/// The ring of SPDZ2k: 64 plaintext bits and 64 bits of security margin.
type Spdz2kRing = Z2k<64, 64>;

/// The ring of Semi2k.
type Ring64 = Z2k<64, 0>;

const NAMES: [(&str, Protocol); 7] = [
    ("MASCOT", Protocol::Mascot),
    ("CowGear", Protocol::CowGear),
    ("SPDZ2k", Protocol::Spdz2k),
    ("Semi", Protocol::Semi),
    ("Semi2k", Protocol::Semi2k),
    ("Shamir", Protocol::Shamir),
    ("MalShamir", Protocol::MalShamir),
];

impl Protocol {
    /// All backends, in the order they are listed in usage messages.
    pub const ALL: [Protocol; 7] = [
        Protocol::Mascot,
        Protocol::CowGear,
        Protocol::Spdz2k,
        Protocol::Semi,
        Protocol::Semi2k,
        Protocol::Shamir,
        Protocol::MalShamir,
    ];

    /// The name the backend is selected by.
    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, p)| *p == self)
            .map(|(name, _)| *name)
            .unwrap_or_default()
    }

    /// Whether the backend takes a threshold.
    pub fn is_threshold(self) -> bool {
        matches!(self, Protocol::Shamir | Protocol::MalShamir)
    }

    /// The modulus of the plaintexts the backend computes on.
    pub fn modulus(self) -> u128 {
        match self {
            Protocol::CowGear => Gf61::MODULUS,
            Protocol::Spdz2k | Protocol::Semi2k => 1 << 64,
            _ => Gf127::MODULUS,
        }
    }

    /// Validates the parameters without touching the network and returns the resolved threshold.
    pub fn validate(
        self,
        params: &SetupParams,
        preprocessor: Preprocessor,
    ) -> Result<Option<usize>, ConfigError> {
        match self {
            Protocol::Mascot => params.validate::<AdditiveMac<Gf127>>(preprocessor),
            Protocol::CowGear => params.validate::<AdditiveMac<Gf61>>(preprocessor),
            Protocol::Spdz2k => params.validate::<AdditiveMac<Spdz2kRing>>(preprocessor),
            Protocol::Semi => params.validate::<Additive<Gf127>>(preprocessor),
            Protocol::Semi2k => params.validate::<Additive<Ring64>>(preprocessor),
            Protocol::Shamir => params.validate::<SemiShamir<Gf127>>(preprocessor),
            Protocol::MalShamir => params.validate::<MalShamir<Gf127>>(preprocessor),
        }
    }

    /// Runs the dot product computation as one of the computing parties.
    ///
    /// `inputs` are the party's private values (reduced modulo [`Protocol::modulus`]); all parties
    /// must provide the same number of values. Returns the dot product of the inputs of party 0
    /// and party 1 after it passed all integrity checks.
    pub async fn dot_product(
        self,
        channel: &impl Channel,
        params: SetupParams,
        preprocessor: Preprocessor,
        inputs: &[u128],
    ) -> Result<u128, Error> {
        match self {
            Protocol::Mascot => {
                dot_product::<AdditiveMac<Gf127>>(channel, params, preprocessor, inputs).await
            }
            Protocol::CowGear => {
                dot_product::<AdditiveMac<Gf61>>(channel, params, preprocessor, inputs).await
            }
            Protocol::Spdz2k => {
                dot_product::<AdditiveMac<Spdz2kRing>>(channel, params, preprocessor, inputs).await
            }
            Protocol::Semi => {
                dot_product::<Additive<Gf127>>(channel, params, preprocessor, inputs).await
            }
            Protocol::Semi2k => {
                dot_product::<Additive<Ring64>>(channel, params, preprocessor, inputs).await
            }
            Protocol::Shamir => {
                dot_product::<SemiShamir<Gf127>>(channel, params, preprocessor, inputs).await
            }
            Protocol::MalShamir => {
                dot_product::<MalShamir<Gf127>>(channel, params, preprocessor, inputs).await
            }
        }
    }

    /// Runs the trusted dealer for the backend.
    pub async fn dealer(
        self,
        channel: &impl Channel,
        parties: usize,
        threshold: Option<usize>,
        triple_budget: Option<usize>,
    ) -> Result<(), Error> {
        match self {
            Protocol::Mascot => {
                dealer::<AdditiveMac<Gf127>>(channel, parties, threshold, triple_budget).await
            }
            Protocol::CowGear => {
                dealer::<AdditiveMac<Gf61>>(channel, parties, threshold, triple_budget).await
            }
            Protocol::Spdz2k => {
                dealer::<AdditiveMac<Spdz2kRing>>(channel, parties, threshold, triple_budget).await
            }
            Protocol::Semi => {
                dealer::<Additive<Gf127>>(channel, parties, threshold, triple_budget).await
            }
            Protocol::Semi2k => {
                dealer::<Additive<Ring64>>(channel, parties, threshold, triple_budget).await
            }
            Protocol::Shamir => {
                dealer::<SemiShamir<Gf127>>(channel, parties, threshold, triple_budget).await
            }
            Protocol::MalShamir => {
                dealer::<MalShamir<Gf127>>(channel, parties, threshold, triple_budget).await
            }
        }
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, p)| *p)
            .ok_or_else(|| ConfigError::UnknownProtocol(s.to_string()))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The input, multiplication and output protocols of one party, sharing one setup.
pub struct ProtocolSet<'a, S: Scheme, C: Channel> {
    /// Shares private inputs.
    pub input: InputProtocol<'a, S, C>,
    /// Computes dot products.
    pub protocol: DotProdProtocol<'a, S, C>,
    /// Opens shared values.
    pub output: OpenProtocol<'a, S, C>,
}

impl<'a, S: Scheme, C: Channel> ProtocolSet<'a, S, C> {
    /// Creates all protocols for this party's private `inputs`.
    pub fn new(setup: &'a ProtocolSetup<'a, S, C>, inputs: Vec<S::Ring>) -> Self {
        Self {
            input: InputProtocol::new(setup, inputs),
            protocol: DotProdProtocol::new(setup),
            output: OpenProtocol::new(setup),
        }
    }
}

/// Runs the dot product computation with the scheme `S`.
///
/// See [`Protocol::dot_product`].
#[instrument(level = Level::DEBUG, skip_all, fields(party = params.party), err)]
pub async fn dot_product<S: Scheme>(
    channel: &impl Channel,
    params: SetupParams,
    preprocessor: Preprocessor,
    inputs: &[u128],
) -> Result<u128, Error> {
    let setup = ProtocolSetup::<S, _>::new(channel, params, preprocessor).await?;
    let n = inputs.len();
    let inputs = inputs.iter().map(|x| S::Ring::from_u128(*x)).collect();
    let ProtocolSet {
        mut input,
        mut protocol,
        mut output,
    } = ProtocolSet::new(&setup, inputs);

    input.reset_all();
    for i in 0..n {
        input.add_from_all(i)?;
    }
    input.exchange().await?;
    let mut a = Vec::with_capacity(n);
    let mut b = Vec::with_capacity(n);
    for _ in 0..n {
        a.push(input.finalize(0)?);
        b.push(input.finalize(1)?);
    }

    protocol.init_dotprod();
    for (a, b) in a.iter().zip(&b) {
        protocol.prepare_dotprod(a, b).await?;
    }
    protocol.next_dotprod()?;
    protocol.exchange().await?;
    let c = protocol.finalize_dotprod(n)?;

    // no value may be opened before the masked factors are verified
    protocol.check().await?;

    output.init_open();
    output.prepare_open(c)?;
    output.exchange().await?;
    let result = output.finalize_open()?;

    // the result is only trusted after its MAC was checked
    output.check().await?;
    info!(%result, "dot product verified");

    drop((input, protocol, output));
    setup.close().await?;
    Ok(result.plaintext())
}

/// Simulates a dot product computation with all parties (and a trusted dealer, if one is used)
/// concurrently in the current task, communicating over in-memory channels.
///
/// `inputs[p]` are the private values of party `p`. Returns the result of every party.
pub async fn simulate_dot_product(
    protocol: Protocol,
    threshold: Option<usize>,
    preprocessor: Preprocessor,
    inputs: &[Vec<u128>],
) -> Result<Vec<u128>, Error> {
    let parties = inputs.len();
    let params = |party| SetupParams {
        party,
        parties,
        threshold,
    };
    for party in 0..parties {
        protocol.validate(&params(party), preprocessor)?;
    }
    if inputs.iter().any(|i| i.len() != inputs[0].len()) {
        return Err(ConfigError::InputLengthMismatch.into());
    }
    let run_parties = async |channels: &[SimpleChannel]| {
        try_join_all(
            channels
                .iter()
                .zip(inputs)
                .enumerate()
                .map(async |(party, (ch, inputs))| {
                    protocol
                        .dot_product(ch, params(party), preprocessor, inputs)
                        .await
                }),
        )
        .await
    };
    match preprocessor {
        Preprocessor::SharedSeed => run_parties(&SimpleChannel::channels(parties)).await,
        Preprocessor::TrustedDealer(d) => {
            let mut channels = SimpleChannel::channels(d + 1);
            let dealer_channel = channels.swap_remove(d);
            let dealer_fut = protocol.dealer(&dealer_channel, parties, threshold, None);
            let (results, ()) = try_join(run_parties(&channels), dealer_fut).await?;
            Ok(results)
        }
    }
}
