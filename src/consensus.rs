//! Broadcast with abort, hash commitments and multi-party coin tossing.

use rand::{SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    channel::{self, Channel, scatter, unverified_broadcast},
    error::{Error, IntegrityError},
};

/// Represents a cryptographic commitment as a fixed-size 32-byte array (a BLAKE3 hash).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct Commitment(pub(crate) [u8; 32]);

/// Commits to a value using the BLAKE3 cryptographic hash function.
/// This is not a general-purpose commitment scheme, the input value is assumed to have high
/// entropy.
pub(crate) fn commit(value: &[u8]) -> Commitment {
    Commitment(blake3::hash(value).into())
}

/// Verifies if a given value matches a previously generated commitment.
/// This is not a general-purpose commitment scheme, the input value is assumed to have high
/// entropy.
pub(crate) fn open_commitment(commitment: &Commitment, value: &[u8]) -> bool {
    blake3::hash(value).as_bytes() == &commitment.0
}

/// Hashes a slice using blake3, truncated to 128 bits.
pub(crate) fn hash_vec<T: Serialize>(data: &[T]) -> Result<u128, Error> {
    let serialized = bincode::serialize(data).map_err(|e| channel::Error {
        phase: "hashing broadcast".to_string(),
        reason: channel::ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    let mut buf = [0u8; 16];
    blake3::Hasher::new()
        .update(&serialized)
        .finalize_xof()
        .fill(&mut buf);
    Ok(u128::from_le_bytes(buf))
}

/// Implements the verification step of broadcast with abort based on Goldwasser and Lindell's
/// protocol: every party echoes the hashes of what it received to everyone else.
pub(crate) async fn broadcast_verification<T: Serialize>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    vec: &[Vec<T>],
) -> Result<(), Error> {
    if n == 2 {
        return Ok(());
    }
    let mut hashes = vec![0u128; n];
    for k in (0..n).filter(|k| *k != i) {
        hashes[k] = hash_vec(&vec[k])?;
    }
    // party k is told about everything except its own and our vector
    let mut echoes = vec![vec![None; n]; n];
    for k in (0..n).filter(|k| *k != i) {
        for j in (0..n).filter(|j| *j != i && *j != k) {
            echoes[k][j] = Some(hashes[j]);
        }
    }
    let received = scatter(channel, i, phase, &echoes).await?;
    for k in (0..n).filter(|k| *k != i) {
        for j in (0..n).filter(|j| *j != i && *j != k) {
            if received[k].get(j).copied().flatten() != Some(hashes[j]) {
                return Err(IntegrityError::InconsistentBroadcast(phase.to_string()).into());
            }
        }
    }
    Ok(())
}

/// Implements broadcast with abort for all parties at once, where each party sends its vector to
/// all others. Returns the vectors of all parties (indexed by party), verified to be consistent.
pub(crate) async fn broadcast<T: Clone + Serialize + DeserializeOwned>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    vec: &[T],
) -> Result<Vec<Vec<T>>, Error> {
    let res = unverified_broadcast(channel, i, n, phase, vec).await?;
    broadcast_verification(channel, i, n, &format!("broadcast {phase}"), &res).await?;
    Ok(res)
}

fn with_id(buf: &[u8; 32], party: usize) -> [u8; 34] {
    let mut buf_id = [0u8; 34];
    buf_id[..32].copy_from_slice(buf);
    buf_id[32..].copy_from_slice(&(party as u16).to_be_bytes());
    buf_id
}

/// Multi-party coin tossing.
///
/// Every party commits to a random 256-bit seed, the commitments are broadcast with abort, then all
/// seeds are opened and XORed into the seed of a `ChaCha20Rng` that all parties share. No party can
/// bias the result without breaking a commitment.
pub(crate) async fn shared_rng(
    channel: &impl Channel,
    i: usize,
    n: usize,
) -> Result<ChaCha20Rng, Error> {
    let buf = random::<[u8; 32]>();
    // the party id keeps commitments unique even if two parties pick the same seed
    let commitment = commit(&with_id(&buf, i));
    let commitments = broadcast(channel, i, n, "RNG comm", &[commitment]).await?;

    let bufs = unverified_broadcast(channel, i, n, "RNG ver", &buf).await?;
    let mut seed = buf;
    for k in (0..n).filter(|k| *k != i) {
        let mut buf_k = [0u8; 32];
        buf_k.copy_from_slice(&bufs[k]);
        if !open_commitment(&commitments[k][0], &with_id(&buf_k, k)) {
            return Err(IntegrityError::CommitmentMismatch(k).into());
        }
        seed.iter_mut().zip(&buf_k).for_each(|(s, b)| *s ^= *b);
    }
    Ok(ChaCha20Rng::from_seed(seed))
}
