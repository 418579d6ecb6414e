//! Batched verification of opened values.
//!
//! For MAC-authenticated schemes, the parties toss coins for random coefficients `r_j` and each
//! party computes `sigma_i = sum(r_j * m_ij) - alpha_i * sum(r_j * x_j)` over the opened values
//! `x_j` with MAC shares `m_ij`. The `sigma_i` are committed to, then opened, and must sum to zero.
//! A party that cheated on any opened value passes only with probability `1 / |F|` over a prime
//! field. Over `Z/2^(k+s)` the bound is roughly `2^-s`, since only the low `k` bits of an opened
//! value are its plaintext.

use rand::random;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, error, instrument};

use crate::{
    channel::{Channel, unverified_broadcast},
    consensus::{broadcast, commit, open_commitment, shared_rng},
    error::{Error, IntegrityError},
    field::Ring,
    setup::ProtocolSetup,
    sharing::{PendingChecks, Scheme},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Opening<F> {
    sigma: F,
    nonce: [u8; 32],
}

fn commitment_input<F: Ring>(party: usize, opening: &Opening<F>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(16 + 32 + 2);
    bytes.extend_from_slice(&opening.sigma.to_u128().to_le_bytes());
    bytes.extend_from_slice(&opening.nonce);
    bytes.extend_from_slice(&(party as u16).to_be_bytes());
    bytes
}

/// Discharges the integrity obligations of `pending`.
///
/// All parties must call this with obligations for the same opened values.
#[instrument(
    level = Level::DEBUG,
    skip_all,
    fields(party = setup.party(), opened = pending.len()),
    err
)]
pub(crate) async fn verify<S: Scheme, C: Channel>(
    setup: &ProtocolSetup<'_, S, C>,
    pending: PendingChecks<S::Ring>,
) -> Result<(), Error> {
    if let Err(e) = setup.scheme().verify_openings(&pending.openings) {
        error!("{e}");
        return Err(e.into());
    }
    if let Some(alpha_i) = setup.scheme().mac_key_share()
        && !pending.macs.is_empty()
    {
        mac_check(setup.channel(), setup.party(), setup.parties(), alpha_i, &pending.macs).await?;
    }
    debug!("all opened values verified");
    Ok(())
}

/// Checks the MACs of opened values `(x_j, m_ij)` with the own key share `alpha_i`.
pub(crate) async fn mac_check<F: Ring>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    alpha_i: F,
    opened: &[(F, F)],
) -> Result<(), Error> {
    let mut rng = shared_rng(channel, i, n).await?;
    let mut value = F::ZERO;
    let mut mac = F::ZERO;
    for (x, m) in opened {
        let r = F::random(&mut rng);
        value += r * *x;
        mac += r * *m;
    }
    let own = Opening {
        sigma: mac - alpha_i * value,
        nonce: random(),
    };
    let commitment = commit(&commitment_input(i, &own));
    let commitments = broadcast(channel, i, n, "MAC check commitment", &[commitment]).await?;
    let openings = unverified_broadcast(channel, i, n, "MAC check opening", &[own]).await?;

    let mut sum = F::ZERO;
    for (k, (c, o)) in commitments.iter().zip(&openings).enumerate() {
        let (Some(c), Some(o)) = (c.first(), o.first()) else {
            return Err(IntegrityError::CommitmentMismatch(k).into());
        };
        if k != i && !open_commitment(c, &commitment_input(k, o)) {
            error!(party = k, "MAC check value does not match its commitment");
            return Err(IntegrityError::CommitmentMismatch(k).into());
        }
        sum += o.sigma;
    }
    if bool::from(sum.ct_eq(&F::ZERO)) {
        Ok(())
    } else {
        error!(opened = opened.len(), "MAC check failed");
        Err(IntegrityError::MacMismatch(opened.len()).into())
    }
}
