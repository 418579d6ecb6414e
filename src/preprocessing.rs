//! Preprocessed material: multiplication triples and input masks.
//!
//! The material store of a party hands out every triple and mask exactly once and pulls a new
//! batch from its source whenever it runs dry. Material either comes from a dealer that every party
//! simulates from a coin-tossed seed, or from a trusted dealer process reachable over the channel.

use std::collections::VecDeque;

use rand::Rng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    channel::{Channel, recv_from, send_to},
    dealer::{Request, Response},
    error::{Error, ProtocolError},
    field::Ring,
    sharing::{DealerState, Scheme},
};

/// The minimum number of triples or masks requested from a source at once.
pub const BATCH_SIZE: usize = 1024;

/// Specifies how correlated randomness is provided in the preprocessing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocessor {
    /// All parties derive the material from a jointly coin-tossed seed.
    ///
    /// Every party learns every share (including the MAC key), so this is only suitable for demos
    /// and tests of the online phase.
    SharedSeed,
    /// A trusted dealer with the given party index generates the material.
    TrustedDealer(usize),
}

/// A multiplication triple `(u, v, w = u * v)`, each component secret-shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple<S> {
    /// The share of the first factor.
    pub u: S,
    /// The share of the second factor.
    pub v: S,
    /// The share of the product.
    pub w: S,
}

/// A shared random value, known in the clear to the party it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMask<F, S> {
    /// The own share of the mask.
    pub share: S,
    /// The mask in the clear, only set for the party that owns it.
    pub value: Option<F>,
}

/// Generates `count` triples and returns them grouped by party.
pub(crate) fn deal_triples<S: Scheme, R: Rng + ?Sized>(
    dealer: &DealerState<S::Ring>,
    count: usize,
    rng: &mut R,
) -> Vec<Vec<Triple<S::Share>>> {
    let mut triples = vec![Vec::with_capacity(count); dealer.parties];
    for _ in 0..count {
        let u = S::Ring::random(rng);
        let v = S::Ring::random(rng);
        let us = S::deal(dealer, u, rng);
        let vs = S::deal(dealer, v, rng);
        let ws = S::deal(dealer, u * v, rng);
        for (p, ((u, v), w)) in us.into_iter().zip(vs).zip(ws).enumerate() {
            triples[p].push(Triple { u, v, w });
        }
    }
    triples
}

/// Type alias for input masks grouped by the party that owns them.
pub type MasksByOwner<S> = Vec<Vec<InputMask<<S as Scheme>::Ring, <S as Scheme>::Share>>>;

/// Generates `count` input masks for every owner and returns them grouped by receiving party.
pub(crate) fn deal_input_masks<S: Scheme, R: Rng + ?Sized>(
    dealer: &DealerState<S::Ring>,
    count: usize,
    rng: &mut R,
) -> Vec<MasksByOwner<S>> {
    let n = dealer.parties;
    let mut masks: Vec<MasksByOwner<S>> = vec![vec![Vec::with_capacity(count); n]; n];
    for owner in 0..n {
        for _ in 0..count {
            let r = S::Ring::random(rng);
            for (p, share) in S::deal(dealer, r, rng).into_iter().enumerate() {
                let value = (p == owner).then_some(r);
                masks[p][owner].push(InputMask { share, value });
            }
        }
    }
    masks
}

enum Source<F> {
    Seeded {
        rng: Box<ChaCha20Rng>,
        dealer: DealerState<F>,
    },
    Dealer(usize),
}

/// Per-party store of preprocessed material with a replenish-on-empty contract.
pub(crate) struct MaterialStore<S: Scheme> {
    party: usize,
    parties: usize,
    source: Source<S::Ring>,
    triples: VecDeque<Triple<S::Share>>,
    masks: Vec<VecDeque<InputMask<S::Ring, S::Share>>>,
}

impl<S: Scheme> MaterialStore<S> {
    /// A store that simulates the dealer from an RNG that all parties share.
    pub(crate) fn seeded(party: usize, dealer: DealerState<S::Ring>, rng: ChaCha20Rng) -> Self {
        let parties = dealer.parties;
        Self::with_source(
            party,
            parties,
            Source::Seeded {
                rng: Box::new(rng),
                dealer,
            },
        )
    }

    /// A store that requests material from the trusted dealer at index `dealer`.
    pub(crate) fn remote(party: usize, parties: usize, dealer: usize) -> Self {
        Self::with_source(party, parties, Source::Dealer(dealer))
    }

    fn with_source(party: usize, parties: usize, source: Source<S::Ring>) -> Self {
        Self {
            party,
            parties,
            source,
            triples: VecDeque::new(),
            masks: vec![VecDeque::new(); parties],
        }
    }

    /// Takes `count` triples, replenishing the store first if necessary.
    pub(crate) async fn triples(
        &mut self,
        channel: &impl Channel,
        count: usize,
    ) -> Result<Vec<Triple<S::Share>>, Error> {
        if self.triples.len() < count {
            let needed = count - self.triples.len();
            let wanted = needed.max(BATCH_SIZE);
            let batch = match &mut self.source {
                Source::Seeded { rng, dealer } => deal_triples::<S, _>(dealer, wanted, &mut **rng)
                    .swap_remove(self.party),
                Source::Dealer(d) => {
                    let req = Request::Triples { needed, wanted };
                    match request::<S>(channel, *d, "triples", &req).await? {
                        Response::Triples(t) if t.len() >= needed => t,
                        Response::Exhausted { requested } => {
                            return Err(Error::PreprocessingExhausted {
                                kind: "triples",
                                requested,
                            });
                        }
                        _ => return Err(ProtocolError::UnexpectedDealerResponse.into()),
                    }
                }
            };
            debug!(triples = batch.len(), "replenished triples");
            self.triples.extend(batch);
        }
        Ok(self.triples.drain(..count).collect())
    }

    /// Takes `count` input masks of every owner, replenishing the store first if necessary.
    pub(crate) async fn input_masks(
        &mut self,
        channel: &impl Channel,
        count: usize,
    ) -> Result<MasksByOwner<S>, Error> {
        let available = self.masks.first().map(VecDeque::len).unwrap_or_default();
        if available < count {
            let wanted = (count - available).max(BATCH_SIZE);
            let batch = match &mut self.source {
                Source::Seeded { rng, dealer } => {
                    deal_input_masks::<S, _>(dealer, wanted, &mut **rng).swap_remove(self.party)
                }
                Source::Dealer(d) => {
                    let req = Request::InputMasks { count: wanted };
                    match request::<S>(channel, *d, "input masks", &req).await? {
                        Response::InputMasks(m)
                            if m.len() == self.parties && m.iter().all(|m| m.len() == wanted) =>
                        {
                            m
                        }
                        _ => return Err(ProtocolError::UnexpectedDealerResponse.into()),
                    }
                }
            };
            debug!(masks = wanted, "replenished input masks");
            for (queue, masks) in self.masks.iter_mut().zip(batch) {
                queue.extend(masks);
            }
        }
        Ok(self
            .masks
            .iter_mut()
            .map(|queue| queue.drain(..count).collect())
            .collect())
    }

    /// Tells a trusted dealer that no more material will be requested.
    pub(crate) async fn close(&self, channel: &impl Channel) -> Result<(), Error> {
        if let Source::Dealer(d) = self.source {
            send_to(channel, d, "preprocessing request", &Request::<S::Ring>::Done).await?;
        }
        Ok(())
    }
}

async fn request<S: Scheme>(
    channel: &impl Channel,
    dealer: usize,
    phase: &str,
    req: &Request<S::Ring>,
) -> Result<Response<S::Ring, S::Share>, Error> {
    send_to(channel, dealer, "preprocessing request", req).await?;
    match recv_from(channel, dealer, phase).await? {
        Response::Error(e) => Err(ProtocolError::DealerAborted(e).into()),
        resp => Ok(resp),
    }
}
