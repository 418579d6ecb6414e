//! Secret-sharing private inputs of all parties.

use std::collections::VecDeque;

use tracing::{Level, debug, instrument};

use crate::{
    channel::Channel,
    consensus::broadcast,
    error::{Error, ProtocolError},
    setup::ProtocolSetup,
    sharing::Scheme,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Collecting,
    Exchanged,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Collecting => "collecting inputs",
            State::Exchanged => "holding exchanged inputs",
        }
    }
}

/// The input protocol: every party contributes values from its own input list.
///
/// A batch is declared with [`InputProtocol::add_from_all`], shared in a single round by
/// [`InputProtocol::exchange`] and then read back owner by owner with [`InputProtocol::finalize`].
pub struct InputProtocol<'a, S: Scheme, C: Channel> {
    setup: &'a ProtocolSetup<'a, S, C>,
    inputs: Vec<S::Ring>,
    state: State,
    indices: Vec<usize>,
    declared: usize,
    shares: Vec<VecDeque<S::Share>>,
}

impl<'a, S: Scheme, C: Channel> InputProtocol<'a, S, C> {
    /// Creates the input protocol for this party's private `inputs`.
    pub fn new(setup: &'a ProtocolSetup<'a, S, C>, inputs: Vec<S::Ring>) -> Self {
        Self {
            setup,
            inputs,
            state: State::Idle,
            indices: vec![],
            declared: 0,
            shares: vec![],
        }
    }

    /// Discards any pending or exchanged batch and starts collecting a new one.
    pub fn reset_all(&mut self) {
        self.state = State::Collecting;
        self.indices.clear();
        self.declared = 0;
        self.shares.clear();
    }

    /// Declares that every party contributes the value at `index` of its own input list.
    pub fn add_from_all(&mut self, index: usize) -> Result<(), Error> {
        if self.state != State::Collecting {
            return Err(self.invalid("add_from_all"));
        }
        if index >= self.inputs.len() {
            return Err(ProtocolError::MissingInput(index).into());
        }
        self.indices.push(index);
        Ok(())
    }

    /// Masks the own contributions, broadcasts them and derives the shares of all contributions.
    #[instrument(level = Level::DEBUG, skip_all, fields(party = self.setup.party()), err)]
    pub async fn exchange(&mut self) -> Result<(), Error> {
        if self.state != State::Collecting {
            return Err(self.invalid("exchange"));
        }
        // a failed round abandons the batch
        self.state = State::Idle;
        let setup = self.setup;
        let (i, n) = (setup.party(), setup.parties());
        let count = self.indices.len();
        let masks = setup.input_masks(count).await?;
        let mut masked = Vec::with_capacity(count);
        for (index, mask) in self.indices.iter().zip(&masks[i]) {
            let Some(r) = mask.value else {
                return Err(ProtocolError::UnexpectedDealerResponse.into());
            };
            masked.push(self.inputs[*index] - r);
        }
        let all_masked = broadcast(setup.channel(), i, n, "masked inputs", &masked).await?;
        let scheme = setup.scheme();
        self.shares = masks
            .iter()
            .zip(&all_masked)
            .map(|(masks, masked)| {
                masks
                    .iter()
                    .zip(masked)
                    .map(|(mask, m)| scheme.add_public(&mask.share, *m))
                    .collect()
            })
            .collect();
        self.indices.clear();
        self.declared = count;
        self.state = State::Exchanged;
        debug!(count, "inputs shared");
        Ok(())
    }

    /// Returns the own share of the next value contributed by `owner`.
    pub fn finalize(&mut self, owner: usize) -> Result<S::Share, Error> {
        if self.state != State::Exchanged {
            return Err(self.invalid("finalize"));
        }
        let Some(queue) = self.shares.get_mut(owner) else {
            return Err(ProtocolError::NoSuchParty(owner).into());
        };
        queue.pop_front().ok_or_else(|| {
            ProtocolError::ContributionsExhausted {
                owner,
                declared: self.declared,
            }
            .into()
        })
    }

    fn invalid(&self, op: &'static str) -> Error {
        ProtocolError::InvalidState {
            op,
            state: self.state.name(),
        }
        .into()
    }
}
