//! The error taxonomy shared by all protocol components.

use crate::channel;

/// A custom error type for secure dot product computations and their communication.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid party, threshold or protocol arguments, detected before any network activity.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// A peer was unreachable, disconnected or sent malformed data during a round.
    #[error("network failure: {0}")]
    Network(#[from] channel::Error),
    /// A component was used in violation of its contract.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The preprocessing source could not supply more triples or input masks.
    #[error("preprocessing exhausted: {requested} more {kind} requested, none left")]
    PreprocessingExhausted {
        /// What ran out.
        kind: &'static str,
        /// How many items were requested when the source ran dry.
        requested: usize,
    },
    /// A MAC or reconstruction consistency check failed. Some party deviated from the protocol.
    #[error("INTEGRITY VIOLATION: {0}")]
    Integrity(#[from] IntegrityError),
}

impl Error {
    /// Returns `true` for failed integrity checks, which indicate an active attack.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }
}

/// Invalid configuration of a computation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The protocol name is not one of the supported backends.
    #[error("unknown protocol `{0}`")]
    UnknownProtocol(String),
    /// Secure computation needs at least two parties.
    #[error("at least {min} parties are required, got {parties}")]
    TooFewParties {
        /// The minimum number of parties.
        min: usize,
        /// The configured number of parties.
        parties: usize,
    },
    /// The own party index is not below the number of parties.
    #[error("party {party} does not exist among {parties} parties")]
    PartyOutOfRange {
        /// The configured own index.
        party: usize,
        /// The configured number of parties.
        parties: usize,
    },
    /// The honest majority requirement `2 * threshold < parties` is violated.
    #[error("threshold {threshold} is too large for {parties} parties (2 * threshold < parties)")]
    ThresholdTooLarge {
        /// The configured threshold.
        threshold: usize,
        /// The configured number of parties.
        parties: usize,
    },
    /// A threshold was given for a backend that does not use one.
    #[error("protocol `{0}` does not take a threshold")]
    ThresholdNotSupported(String),
    /// The trusted dealer must use an index outside of the computing parties.
    #[error("trusted dealer index {dealer} collides with the {parties} computing parties")]
    InvalidDealer {
        /// The configured dealer index.
        dealer: usize,
        /// The configured number of parties.
        parties: usize,
    },
    /// The field has too few elements to give every party a distinct evaluation point.
    #[error("the field is too small for {0} parties")]
    FieldTooSmall(usize),
    /// The parties' input lists do not have the same length.
    #[error("all parties must provide the same number of inputs")]
    InputLengthMismatch,
}

/// Misuse of a protocol component, e.g. finalizing before the exchange round.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// An operation was called in a state that does not allow it.
    #[error("`{op}` is not allowed while {state}")]
    InvalidState {
        /// The operation that was called.
        op: &'static str,
        /// The state the component was in.
        state: &'static str,
    },
    /// No local input exists at the given index.
    #[error("no local input at index {0}")]
    MissingInput(usize),
    /// The owner index does not refer to a party.
    #[error("party {0} does not exist")]
    NoSuchParty(usize),
    /// All contributions of a party have already been finalized.
    #[error("all {declared} contributions of party {owner} have been finalized")]
    ContributionsExhausted {
        /// The contributing party.
        owner: usize,
        /// The number of contributions in the batch.
        declared: usize,
    },
    /// No exchanged result is waiting to be finalized.
    #[error("nothing left to finalize, call `exchange` first")]
    NothingToFinalize,
    /// The number of products in a dot product differs from the expected count.
    #[error("dot product has {actual} terms, expected {expected}")]
    TermCountMismatch {
        /// The count passed by the caller.
        expected: usize,
        /// The number of prepared products.
        actual: usize,
    },
    /// The parties requested different preprocessing material from the dealer.
    #[error("parties disagree about the requested preprocessing: {0}")]
    DealerRequestMismatch(String),
    /// The trusted dealer aborted and told us why.
    #[error("the trusted dealer aborted: {0}")]
    DealerAborted(String),
    /// The dealer answered with material of the wrong kind or size.
    #[error("unexpected response from the trusted dealer")]
    UnexpectedDealerResponse,
}

/// A failed integrity check. Never recoverable: any value opened in the batch must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// The random linear combination of opened values does not match its MAC.
    #[error("MAC check failed for {0} opened values")]
    MacMismatch(usize),
    /// A party's MAC check value did not match its commitment.
    #[error("party {0} opened a value that does not match its commitment")]
    CommitmentMismatch(usize),
    /// The opened points do not lie on a single polynomial of degree `threshold`.
    #[error("shares of {0} opened values are inconsistent")]
    InconsistentShares(usize),
    /// A broadcast value was sent differently to different parties.
    #[error("inconsistent broadcast during {0}")]
    InconsistentBroadcast(String),
}
