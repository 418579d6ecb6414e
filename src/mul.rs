//! Dot products of shared vectors using Beaver triples, in a single round per batch.
//!
//! For each product `a * b` a triple `(u, v, w)` is consumed and `d = a - u`, `e = b - v` are
//! opened. Then `a * b = w + d * v + e * u + d * e`, where the last term is public. Summing these
//! terms over all pairs yields a share of the dot product, no matter how many pairs there are.

use std::collections::VecDeque;

use tracing::{Level, debug, instrument};

use crate::{
    channel::{Channel, unverified_broadcast},
    check::verify,
    error::{Error, ProtocolError},
    field::Ring,
    setup::ProtocolSetup,
    sharing::{PendingChecks, Scheme},
};

#[derive(Debug, Clone)]
struct Masked<T> {
    d: T,
    e: T,
    u: T,
    v: T,
}

#[derive(Debug, Clone)]
struct DotProduct<T> {
    w_sum: T,
    terms: Vec<Masked<T>>,
}

/// The multiplication protocol, accumulating pairwise products into dot products.
///
/// Several dot products can be staged with [`DotProdProtocol::next_dotprod`] before all of them
/// are completed by one call of [`DotProdProtocol::exchange`].
pub struct DotProdProtocol<'a, S: Scheme, C: Channel> {
    setup: &'a ProtocolSetup<'a, S, C>,
    current: Option<DotProduct<S::Share>>,
    staged: Vec<DotProduct<S::Share>>,
    results: VecDeque<(S::Share, usize)>,
    pending: PendingChecks<S::Ring>,
}

impl<'a, S: Scheme, C: Channel> DotProdProtocol<'a, S, C> {
    /// Creates the multiplication protocol.
    pub fn new(setup: &'a ProtocolSetup<'a, S, C>) -> Self {
        Self {
            setup,
            current: None,
            staged: vec![],
            results: VecDeque::new(),
            pending: PendingChecks::default(),
        }
    }

    /// Starts a new dot product with an empty sum.
    pub fn init_dotprod(&mut self) {
        self.current = Some(DotProduct {
            w_sum: self.setup.scheme().zero(),
            terms: vec![],
        });
    }

    /// Adds the product `a * b` to the current dot product, consuming one triple.
    pub async fn prepare_dotprod(&mut self, a: &S::Share, b: &S::Share) -> Result<(), Error> {
        if self.current.is_none() {
            return Err(ProtocolError::InvalidState {
                op: "prepare_dotprod",
                state: "no dot product was initialized",
            }
            .into());
        }
        let mut triples = self.setup.triples(1).await?;
        let (Some(t), Some(current)) = (triples.pop(), self.current.as_mut()) else {
            return Err(Error::PreprocessingExhausted {
                kind: "triples",
                requested: 1,
            });
        };
        let scheme = self.setup.scheme();
        current.w_sum = scheme.add(&current.w_sum, &t.w);
        current.terms.push(Masked {
            d: scheme.sub(a, &t.u),
            e: scheme.sub(b, &t.v),
            u: t.u,
            v: t.v,
        });
        Ok(())
    }

    /// Stages the current dot product for the next exchange and starts a new one.
    pub fn next_dotprod(&mut self) -> Result<(), Error> {
        let Some(current) = self.current.take() else {
            return Err(ProtocolError::InvalidState {
                op: "next_dotprod",
                state: "no dot product was initialized",
            }
            .into());
        };
        self.staged.push(current);
        self.init_dotprod();
        Ok(())
    }

    /// Opens the masked factors of all staged dot products in a single round.
    #[instrument(level = Level::DEBUG, skip_all, fields(party = self.setup.party()), err)]
    pub async fn exchange(&mut self) -> Result<(), Error> {
        let setup = self.setup;
        let scheme = setup.scheme();
        let (i, n) = (setup.party(), setup.parties());
        let staged = std::mem::take(&mut self.staged);
        let parts: Vec<S::Ring> = staged
            .iter()
            .flat_map(|p| &p.terms)
            .flat_map(|t| [scheme.open_part(&t.d), scheme.open_part(&t.e)])
            .collect();
        let all_parts = unverified_broadcast(setup.channel(), i, n, "dot product", &parts).await?;

        let mut offset = 0;
        for product in staged {
            let mut share = product.w_sum;
            let mut public = S::Ring::ZERO;
            for term in &product.terms {
                let d = self.open(&term.d, &all_parts, offset)?;
                let e = self.open(&term.e, &all_parts, offset + 1)?;
                offset += 2;
                share = scheme.add(&share, &scheme.mul_public(&term.v, d));
                share = scheme.add(&share, &scheme.mul_public(&term.u, e));
                public += d * e;
            }
            let share = scheme.add_public(&share, public);
            self.results.push_back((share, product.terms.len()));
        }
        debug!(opened = offset, "dot products exchanged");
        Ok(())
    }

    fn open(
        &mut self,
        share: &S::Share,
        all_parts: &[Vec<S::Ring>],
        index: usize,
    ) -> Result<S::Ring, Error> {
        let scheme = self.setup.scheme();
        let parts: Vec<S::Ring> = all_parts.iter().map(|p| p[index]).collect();
        let value = scheme.reconstruct(&parts)?;
        scheme.defer_check(share, parts, value, &mut self.pending);
        Ok(value)
    }

    /// Returns the share of the next exchanged dot product, which must have `n` terms.
    pub fn finalize_dotprod(&mut self, n: usize) -> Result<S::Share, Error> {
        let Some((share, terms)) = self.results.pop_front() else {
            return Err(ProtocolError::NothingToFinalize.into());
        };
        if terms != n {
            return Err(ProtocolError::TermCountMismatch {
                expected: n,
                actual: terms,
            }
            .into());
        }
        Ok(share)
    }

    /// Verifies all values opened by this protocol since the last check.
    pub async fn check(&mut self) -> Result<(), Error> {
        let pending = std::mem::take(&mut self.pending);
        verify(self.setup, pending).await
    }
}

#[cfg(test)]
mod tests {
    use futures::future::{join_all, try_join_all};

    use super::*;
    use crate::{
        channel::SimpleChannel,
        error::IntegrityError,
        field::Gf61,
        preprocessing::Preprocessor,
        setup::SetupParams,
        sharing::{AdditiveMac, MacShare, MalShamir, ShamirShare},
    };

    /// Computes `2 * 3` where the last party applies `tamper` to its share of the first factor,
    /// and returns the result of every party's check.
    async fn tampered_factor<S: Scheme>(
        parties: usize,
        tamper: fn(S::Share) -> S::Share,
    ) -> Vec<Result<(), Error>> {
        let channels = SimpleChannel::channels(parties);
        join_all(channels.iter().enumerate().map(async |(party, ch)| {
            let params = SetupParams {
                party,
                parties,
                threshold: None,
            };
            let setup = ProtocolSetup::<S, _>::new(ch, params, Preprocessor::SharedSeed).await?;
            let scheme = setup.scheme();
            let mut a = scheme.add_public(&scheme.zero(), S::Ring::from_u128(2));
            if party == parties - 1 {
                a = tamper(a);
            }
            let b = scheme.add_public(&scheme.zero(), S::Ring::from_u128(3));
            let mut mul = DotProdProtocol::new(&setup);
            mul.init_dotprod();
            mul.prepare_dotprod(&a, &b).await?;
            mul.next_dotprod()?;
            mul.exchange().await?;
            mul.finalize_dotprod(1)?;
            mul.check().await
        }))
        .await
    }

    #[tokio::test]
    async fn tampered_factor_fails_the_mac_check() {
        let results = tampered_factor::<AdditiveMac<Gf61>>(2, |s| MacShare {
            value: s.value + Gf61::ONE,
            ..s
        })
        .await;
        for result in results {
            assert!(matches!(
                result,
                Err(Error::Integrity(IntegrityError::MacMismatch(2)))
            ));
        }
    }

    #[tokio::test]
    async fn tampered_factor_fails_the_consistency_check() {
        let results = tampered_factor::<MalShamir<Gf61>>(3, |s| ShamirShare {
            y: s.y + Gf61::ONE,
            ..s
        })
        .await;
        for result in results {
            assert!(matches!(
                result,
                Err(Error::Integrity(IntegrityError::InconsistentShares(_)))
            ));
        }
    }

    #[tokio::test]
    async fn two_dot_products_share_one_round() -> Result<(), Error> {
        let parties = 3;
        let channels = SimpleChannel::channels(parties);
        let results = try_join_all(channels.iter().enumerate().map(async |(party, ch)| {
            let params = SetupParams {
                party,
                parties,
                threshold: None,
            };
            let setup =
                ProtocolSetup::<MalShamir<Gf61>, _>::new(ch, params, Preprocessor::SharedSeed)
                    .await?;
            // public constants as shares: every point of a constant polynomial is the constant
            let c = |x: u32| setup.scheme().add_public(&setup.scheme().zero(), Gf61::from(x));
            let mut mul = DotProdProtocol::new(&setup);
            assert!(mul.next_dotprod().is_err());
            mul.init_dotprod();
            mul.prepare_dotprod(&c(2), &c(3)).await?;
            mul.prepare_dotprod(&c(4), &c(5)).await?;
            mul.next_dotprod()?;
            mul.prepare_dotprod(&c(6), &c(7)).await?;
            mul.next_dotprod()?;
            mul.exchange().await?;
            assert!(matches!(
                mul.finalize_dotprod(3),
                Err(Error::Protocol(ProtocolError::TermCountMismatch {
                    expected: 3,
                    actual: 2
                }))
            ));
            let second = mul.finalize_dotprod(1)?;
            assert!(matches!(
                mul.finalize_dotprod(1),
                Err(Error::Protocol(ProtocolError::NothingToFinalize))
            ));
            mul.check().await?;
            Ok::<ShamirShare<Gf61>, Error>(second)
        }))
        .await?;
        let ys: Vec<Gf61> = results.iter().map(|s| s.y).collect();
        let points: Vec<_> = ys
            .iter()
            .enumerate()
            .map(|(k, y)| (crate::sharing::shamir::point(k), *y))
            .collect();
        assert_eq!(
            crate::sharing::shamir::reconstruct_checked(&points, 1),
            Ok(Gf61::from(42))
        );
        Ok(())
    }
}
