//! Secret-sharing backends behind a common [`Scheme`] interface.
//!
//! A scheme instance holds the run-wide, immutable state of one party (its index, the party count
//! and, depending on the backend, a MAC key share or a threshold) and provides the local linear
//! operations on shares, the reconstruction of opened values and the bookkeeping of the integrity
//! obligations that opened values leave behind.

use std::fmt::Debug;

use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{ConfigError, Error, IntegrityError},
    field::Ring,
};

pub mod additive;
pub mod shamir;

pub use additive::{Additive, AdditiveMac, AdditiveShare, MacShare};
pub use shamir::{MalShamir, SemiShamir, Shamir, ShamirShare};

/// The immutable per-party state a [`Scheme`] is created from.
#[derive(Debug, Clone)]
pub struct SetupState<F> {
    /// The own party index.
    pub party: usize,
    /// The number of computing parties.
    pub parties: usize,
    /// The (already validated) threshold of threshold schemes.
    pub threshold: Option<usize>,
    /// The own share of the global MAC key, zero for schemes without MACs.
    pub mac_key_share: F,
}

/// What a dealer needs to know to share secrets among all parties.
#[derive(Debug, Clone)]
pub struct DealerState<F> {
    /// The number of computing parties.
    pub parties: usize,
    /// The threshold of threshold schemes.
    pub threshold: Option<usize>,
    /// The global MAC key, i.e. the sum of all MAC key shares.
    pub mac_key: F,
}

/// Integrity obligations of opened values, discharged by the next check.
#[derive(Debug, Clone)]
pub struct PendingChecks<F> {
    /// Opened values together with the own MAC share of the opened sharing.
    pub macs: Vec<(F, F)>,
    /// All parties' parts of opened values, indexed by party.
    pub openings: Vec<Vec<F>>,
}

impl<F> Default for PendingChecks<F> {
    fn default() -> Self {
        Self {
            macs: vec![],
            openings: vec![],
        }
    }
}

impl<F> PendingChecks<F> {
    /// The number of opened values that are waiting to be checked.
    pub fn len(&self) -> usize {
        self.macs.len().max(self.openings.len())
    }

    /// Returns `true` if no opened value is waiting to be checked.
    pub fn is_empty(&self) -> bool {
        self.macs.is_empty() && self.openings.is_empty()
    }
}

/// A secret-sharing backend.
pub trait Scheme: Sized + Send + Sync + 'static {
    /// The ring the shared values live in.
    type Ring: Ring;
    /// The share a single party holds of a secret.
    type Share: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Whether shares carry MACs under a global MAC key.
    const AUTHENTICATED: bool;

    /// Validates the requested threshold for the given number of parties.
    ///
    /// Threshold schemes fill in the default `(parties - 1) / 2` and enforce `2t < parties`, all
    /// other schemes reject any threshold.
    fn threshold(parties: usize, requested: Option<usize>) -> Result<Option<usize>, ConfigError>;

    /// Creates the scheme state of one party.
    fn new(state: SetupState<Self::Ring>) -> Result<Self, Error>;

    /// Splits `secret` into one share per party.
    fn deal<R: Rng + ?Sized>(
        dealer: &DealerState<Self::Ring>,
        secret: Self::Ring,
        rng: &mut R,
    ) -> Vec<Self::Share>;

    /// The own party index.
    fn party(&self) -> usize;

    /// The number of computing parties.
    fn parties(&self) -> usize;

    /// A sharing of zero.
    fn zero(&self) -> Self::Share;

    /// Adds two shares.
    fn add(&self, a: &Self::Share, b: &Self::Share) -> Self::Share;

    /// Subtracts two shares.
    fn sub(&self, a: &Self::Share, b: &Self::Share) -> Self::Share;

    /// Multiplies a share with a public constant.
    fn mul_public(&self, a: &Self::Share, c: Self::Ring) -> Self::Share;

    /// Adds a public constant to a shared value.
    fn add_public(&self, a: &Self::Share, c: Self::Ring) -> Self::Share;

    /// The part of a share that is sent to the other parties when the value is opened.
    fn open_part(&self, share: &Self::Share) -> Self::Ring;

    /// Reconstructs a value from the parts of all parties (indexed by party).
    fn reconstruct(&self, parts: &[Self::Ring]) -> Result<Self::Ring, Error>;

    /// Records what the next check has to verify about an opened value.
    fn defer_check(
        &self,
        share: &Self::Share,
        parts: Vec<Self::Ring>,
        value: Self::Ring,
        pending: &mut PendingChecks<Self::Ring>,
    );

    /// The own MAC key share, for schemes with MACs.
    fn mac_key_share(&self) -> Option<Self::Ring> {
        None
    }

    /// Checks the recorded openings locally, without any communication.
    fn verify_openings(&self, _openings: &[Vec<Self::Ring>]) -> Result<(), IntegrityError> {
        Ok(())
    }
}
