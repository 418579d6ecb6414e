//! Opening shared values to all parties.

use std::collections::VecDeque;

use tracing::{Level, debug, instrument, warn};

use crate::{
    channel::{Channel, unverified_broadcast},
    check::verify,
    error::{Error, ProtocolError},
    field::Ring,
    setup::ProtocolSetup,
    sharing::{PendingChecks, Scheme},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Opening,
    Opened,
}

/// The output protocol, reconstructing shared values in the clear.
///
/// Opened values are only provisionally trusted: a value must not be used before
/// [`OpenProtocol::check`] has succeeded. A failed check discards all values of the batch.
pub struct OpenProtocol<'a, S: Scheme, C: Channel> {
    setup: &'a ProtocolSetup<'a, S, C>,
    state: State,
    staged: Vec<S::Share>,
    opened: VecDeque<S::Ring>,
    pending: PendingChecks<S::Ring>,
}

impl<'a, S: Scheme, C: Channel> OpenProtocol<'a, S, C> {
    /// Creates the output protocol.
    pub fn new(setup: &'a ProtocolSetup<'a, S, C>) -> Self {
        Self {
            setup,
            state: State::Idle,
            staged: vec![],
            opened: VecDeque::new(),
            pending: PendingChecks::default(),
        }
    }

    /// Starts a new batch of values to open.
    pub fn init_open(&mut self) {
        self.state = State::Opening;
        self.staged.clear();
        self.opened.clear();
    }

    /// Stages a share for opening.
    pub fn prepare_open(&mut self, share: S::Share) -> Result<(), Error> {
        if self.state != State::Opening {
            return Err(ProtocolError::InvalidState {
                op: "prepare_open",
                state: "no open batch was initialized",
            }
            .into());
        }
        self.staged.push(share);
        Ok(())
    }

    /// Sends the staged shares to all parties and reconstructs the values.
    #[instrument(level = Level::DEBUG, skip_all, fields(party = self.setup.party()), err)]
    pub async fn exchange(&mut self) -> Result<(), Error> {
        if self.state != State::Opening {
            return Err(ProtocolError::InvalidState {
                op: "exchange",
                state: "no open batch was initialized",
            }
            .into());
        }
        self.state = State::Idle;
        let setup = self.setup;
        let scheme = setup.scheme();
        let staged = std::mem::take(&mut self.staged);
        let staged = self.mask_upper_bits(staged).await?;
        let parts: Vec<S::Ring> = staged.iter().map(|s| scheme.open_part(s)).collect();
        let all_parts = unverified_broadcast(
            setup.channel(),
            setup.party(),
            setup.parties(),
            "open",
            &parts,
        )
        .await?;
        for (j, share) in staged.iter().enumerate() {
            let parts: Vec<S::Ring> = all_parts.iter().map(|p| p[j]).collect();
            let value = scheme.reconstruct(&parts)?;
            scheme.defer_check(share, parts, value, &mut self.pending);
            self.opened.push_back(value);
        }
        self.state = State::Opened;
        debug!(opened = staged.len(), "values opened");
        Ok(())
    }

    /// Adds a random multiple of `2^k` to each share if only the low `k` bits of the ring carry
    /// the plaintext, so that opening reveals nothing about the bits above it.
    async fn mask_upper_bits(&self, staged: Vec<S::Share>) -> Result<Vec<S::Share>, Error> {
        let Some(k) = S::Ring::PLAINTEXT_BITS.filter(|k| *k < S::Ring::BITS) else {
            return Ok(staged);
        };
        let shift = S::Ring::from_u128(1 << k);
        let scheme = self.setup.scheme();
        let masks = self.setup.triples(staged.len()).await?;
        Ok(staged
            .iter()
            .zip(masks)
            .map(|(share, mask)| scheme.add(share, &scheme.mul_public(&mask.u, shift)))
            .collect())
    }

    /// Returns the next opened value, in the order the shares were staged.
    pub fn finalize_open(&mut self) -> Result<S::Ring, Error> {
        if self.state != State::Opened {
            return Err(ProtocolError::InvalidState {
                op: "finalize_open",
                state: "no values were opened",
            }
            .into());
        }
        self.opened
            .pop_front()
            .ok_or(ProtocolError::NothingToFinalize.into())
    }

    /// Verifies all values opened by this protocol since the last check.
    pub async fn check(&mut self) -> Result<(), Error> {
        let pending = std::mem::take(&mut self.pending);
        let result = verify(self.setup, pending).await;
        if result.is_err() {
            warn!("discarding all opened values");
            self.opened.clear();
            self.state = State::Idle;
        }
        result
    }
}
