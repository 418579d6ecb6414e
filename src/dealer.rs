//! A trusted dealer process, providing triples and input masks to all computing parties.

use futures::future::try_join_all;
use rand::{SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::{
    channel::{Channel, recv_from, send_to},
    error::{Error, ProtocolError},
    field::Ring,
    preprocessing::{InputMask, Triple, deal_input_masks, deal_triples},
    sharing::{DealerState, Scheme},
};

/// A message from a computing party to the dealer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request<F> {
    /// The party's share of the global MAC key (zero for schemes without MACs).
    MacKeyShare(F),
    /// At least `needed`, at most `wanted` triples.
    Triples {
        /// The minimum number of triples.
        needed: usize,
        /// The number of triples the party would like to buffer.
        wanted: usize,
    },
    /// `count` input masks for every owner.
    InputMasks {
        /// The number of masks per owner.
        count: usize,
    },
    /// The party will not request anything else.
    Done,
}

/// A message from the dealer to a computing party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response<F, S> {
    /// The party's shares of the requested triples.
    Triples(Vec<Triple<S>>),
    /// The party's shares of the requested input masks, grouped by owner.
    InputMasks(Vec<Vec<InputMask<F, S>>>),
    /// The triple budget of the dealer does not cover the request.
    Exhausted {
        /// The number of triples that were requested at least.
        requested: usize,
    },
    /// The dealer aborted, e.g. because the parties sent different requests.
    Error(String),
}

/// Runs a trusted dealer for `parties` computing parties (with indices `0..parties`).
///
/// All parties must send the same sequence of requests, the dealer answers each request once all
/// parties have sent it. If `triple_budget` is set, the dealer hands out at most that many triples
/// per party and answers any request beyond it with [`Response::Exhausted`].
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn dealer<S: Scheme>(
    channel: &impl Channel,
    parties: usize,
    threshold: Option<usize>,
    triple_budget: Option<usize>,
) -> Result<(), Error> {
    let threshold = S::threshold(parties, threshold)?;
    debug!("dealer for {parties} parties");
    let mut rng = ChaCha20Rng::from_seed(random());

    let key_shares: Vec<Request<S::Ring>> = try_join_all(
        (0..parties).map(async |p| recv_from(channel, p, "preprocessing request").await),
    )
    .await?;
    let mut mac_key = S::Ring::ZERO;
    for req in key_shares {
        match req {
            Request::MacKeyShare(alpha_i) => mac_key += alpha_i,
            other => {
                let e = ProtocolError::DealerRequestMismatch(format!(
                    "expected a MAC key share, got {other:?}"
                ));
                abort::<S>(channel, parties, &e).await?;
                return Err(e.into());
            }
        }
    }
    let state = DealerState {
        parties,
        threshold,
        mac_key,
    };
    debug!("dealer received all MAC key shares");

    let mut remaining = triple_budget;
    loop {
        let requests: Vec<Request<S::Ring>> = try_join_all(
            (0..parties).map(async |p| recv_from(channel, p, "preprocessing request").await),
        )
        .await?;
        let Some(req) = requests.first().cloned() else {
            return Ok(());
        };
        if requests.iter().any(|r| *r != req) {
            let e = ProtocolError::DealerRequestMismatch(format!("{requests:?}"));
            abort::<S>(channel, parties, &e).await?;
            return Err(e.into());
        }
        match req {
            Request::Done => {
                debug!("all parties are done");
                return Ok(());
            }
            Request::Triples { needed, wanted } => {
                let count = match remaining {
                    Some(r) if r < needed => {
                        debug!(needed, remaining = r, "triple budget exhausted");
                        let resp = Response::<S::Ring, S::Share>::Exhausted { requested: needed };
                        try_join_all(
                            (0..parties)
                                .map(async |p| send_to(channel, p, "triples", &resp).await),
                        )
                        .await?;
                        continue;
                    }
                    Some(r) => wanted.min(r),
                    None => wanted,
                };
                remaining = remaining.map(|r| r - count);
                let triples = deal_triples::<S, _>(&state, count, &mut rng);
                try_join_all(triples.into_iter().enumerate().map(async |(p, t)| {
                    let resp = Response::<S::Ring, S::Share>::Triples(t);
                    send_to(channel, p, "triples", &resp).await
                }))
                .await?;
                debug!(count, "dealer sent triples to all parties");
            }
            Request::InputMasks { count } => {
                let masks = deal_input_masks::<S, _>(&state, count, &mut rng);
                try_join_all(masks.into_iter().enumerate().map(async |(p, m)| {
                    let resp = Response::<S::Ring, S::Share>::InputMasks(m);
                    send_to(channel, p, "input masks", &resp).await
                }))
                .await?;
                debug!(count, "dealer sent input masks to all parties");
            }
            Request::MacKeyShare(_) => {
                let e = ProtocolError::DealerRequestMismatch(
                    "MAC key shares can only be sent once".to_string(),
                );
                abort::<S>(channel, parties, &e).await?;
                return Err(e.into());
            }
        }
    }
}

async fn abort<S: Scheme>(
    channel: &impl Channel,
    parties: usize,
    e: &ProtocolError,
) -> Result<(), Error> {
    let resp = Response::<S::Ring, S::Share>::Error(e.to_string());
    try_join_all((0..parties).map(async |p| send_to(channel, p, "error", &resp).await)).await?;
    Ok(())
}
