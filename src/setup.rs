//! Run-wide protocol state: validated parameters, the scheme state and the preprocessing store.

use tokio::sync::Mutex;
use tracing::{Level, info, instrument};

use crate::{
    channel::{Channel, send_to},
    consensus::shared_rng,
    dealer::Request,
    error::{ConfigError, Error},
    field::Ring,
    preprocessing::{MasksByOwner, MaterialStore, Preprocessor, Triple},
    sharing::{DealerState, Scheme, SetupState},
};

/// Party and threshold parameters of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupParams {
    /// The own party index, in `0..parties`.
    pub party: usize,
    /// The number of computing parties (excluding a trusted dealer).
    pub parties: usize,
    /// The threshold of threshold schemes, `None` selects the default `(parties - 1) / 2`.
    pub threshold: Option<usize>,
}

impl SetupParams {
    /// Checks the parameters for the scheme `S` and resolves its threshold.
    ///
    /// This never touches the network, so a misconfigured party fails before connecting to anyone.
    pub fn validate<S: Scheme>(
        &self,
        preprocessor: Preprocessor,
    ) -> Result<Option<usize>, ConfigError> {
        if self.parties < 2 {
            return Err(ConfigError::TooFewParties {
                min: 2,
                parties: self.parties,
            });
        }
        if self.party >= self.parties {
            return Err(ConfigError::PartyOutOfRange {
                party: self.party,
                parties: self.parties,
            });
        }
        if let Preprocessor::TrustedDealer(dealer) = preprocessor {
            if dealer < self.parties {
                return Err(ConfigError::InvalidDealer {
                    dealer,
                    parties: self.parties,
                });
            }
        }
        S::threshold(self.parties, self.threshold)
    }
}

/// The immutable state of one party for the duration of a run, shared by all protocol components.
///
/// The preprocessing store is the only mutable part and sits behind an async mutex, so that
/// several components can draw material from it without ever receiving the same triple twice.
pub struct ProtocolSetup<'ch, S: Scheme, C: Channel> {
    channel: &'ch C,
    scheme: S,
    store: Mutex<MaterialStore<S>>,
}

impl<'ch, S: Scheme, C: Channel> ProtocolSetup<'ch, S, C> {
    /// Validates the parameters, then sets up the MAC key shares and the preprocessing source.
    #[instrument(level = Level::DEBUG, skip_all, fields(party = params.party), err)]
    pub async fn new(
        channel: &'ch C,
        params: SetupParams,
        preprocessor: Preprocessor,
    ) -> Result<Self, Error> {
        let threshold = params.validate::<S>(preprocessor)?;
        let SetupParams { party, parties, .. } = params;
        let (mac_key_share, store) = match preprocessor {
            Preprocessor::SharedSeed => {
                let mut rng = shared_rng(channel, party, parties).await?;
                let key_shares: Vec<S::Ring> = (0..parties)
                    .map(|_| {
                        if S::AUTHENTICATED {
                            S::Ring::random(&mut rng)
                        } else {
                            S::Ring::ZERO
                        }
                    })
                    .collect();
                let dealer = DealerState {
                    parties,
                    threshold,
                    mac_key: key_shares.iter().copied().sum(),
                };
                let store = MaterialStore::seeded(party, dealer, rng);
                (key_shares[party], store)
            }
            Preprocessor::TrustedDealer(dealer) => {
                let alpha_i = if S::AUTHENTICATED {
                    random_element::<S::Ring>()
                } else {
                    S::Ring::ZERO
                };
                send_to(
                    channel,
                    dealer,
                    "preprocessing request",
                    &Request::MacKeyShare(alpha_i),
                )
                .await?;
                (alpha_i, MaterialStore::remote(party, parties, dealer))
            }
        };
        let scheme = S::new(SetupState {
            party,
            parties,
            threshold,
            mac_key_share,
        })?;
        info!(party, parties, ?threshold, ?preprocessor, "protocol setup complete");
        Ok(Self {
            channel,
            scheme,
            store: Mutex::new(store),
        })
    }

    /// The scheme state of this party.
    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    /// The own party index.
    pub fn party(&self) -> usize {
        self.scheme.party()
    }

    /// The number of computing parties.
    pub fn parties(&self) -> usize {
        self.scheme.parties()
    }

    pub(crate) fn channel(&self) -> &'ch C {
        self.channel
    }

    pub(crate) async fn triples(&self, count: usize) -> Result<Vec<Triple<S::Share>>, Error> {
        self.store.lock().await.triples(self.channel, count).await
    }

    pub(crate) async fn input_masks(&self, count: usize) -> Result<MasksByOwner<S>, Error> {
        self.store
            .lock()
            .await
            .input_masks(self.channel, count)
            .await
    }

    /// Ends the run, releasing a trusted dealer.
    pub async fn close(self) -> Result<(), Error> {
        self.store.into_inner().close(self.channel).await
    }
}

/// Keeps the thread-local RNG out of the state of the surrounding future.
fn random_element<F: Ring>() -> F {
    F::random(&mut rand::rng())
}

