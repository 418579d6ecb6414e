//! Additive sharing, with (SPDZ-style) and without MACs.

use std::marker::PhantomData;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Error},
    field::Ring,
    sharing::{DealerState, PendingChecks, Scheme, SetupState},
};

/// An additive share of `x` together with an additive share of the MAC `alpha * x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacShare<F> {
    /// The share of the value.
    pub value: F,
    /// The share of the MAC of the value.
    pub mac: F,
}

/// Additive sharing with information-theoretic MACs under a global key `alpha`.
///
/// The key is the sum of the parties' key shares and is never assembled. Opened values are
/// provisionally trusted until a check has verified their MACs.
#[derive(Debug, Clone)]
pub struct AdditiveMac<F> {
    party: usize,
    parties: usize,
    alpha_i: F,
}

fn split<F: Ring, R: Rng + ?Sized>(secret: F, parties: usize, rng: &mut R) -> Vec<F> {
    let mut shares: Vec<F> = (1..parties).map(|_| F::random(rng)).collect();
    let sum: F = shares.iter().copied().sum();
    shares.insert(0, secret - sum);
    shares
}

fn no_threshold(requested: Option<usize>) -> Result<Option<usize>, ConfigError> {
    match requested {
        None => Ok(None),
        Some(_) => Err(ConfigError::ThresholdNotSupported(
            "additive sharing".to_string(),
        )),
    }
}

impl<F: Ring> Scheme for AdditiveMac<F> {
    type Ring = F;
    type Share = MacShare<F>;

    const AUTHENTICATED: bool = true;

    fn threshold(_parties: usize, requested: Option<usize>) -> Result<Option<usize>, ConfigError> {
        no_threshold(requested)
    }

    fn new(state: SetupState<F>) -> Result<Self, Error> {
        Ok(Self {
            party: state.party,
            parties: state.parties,
            alpha_i: state.mac_key_share,
        })
    }

    fn deal<R: Rng + ?Sized>(dealer: &DealerState<F>, secret: F, rng: &mut R) -> Vec<MacShare<F>> {
        let values = split(secret, dealer.parties, rng);
        let macs = split(dealer.mac_key * secret, dealer.parties, rng);
        values
            .into_iter()
            .zip(macs)
            .map(|(value, mac)| MacShare { value, mac })
            .collect()
    }

    fn party(&self) -> usize {
        self.party
    }

    fn parties(&self) -> usize {
        self.parties
    }

    fn zero(&self) -> MacShare<F> {
        MacShare {
            value: F::ZERO,
            mac: F::ZERO,
        }
    }

    fn add(&self, a: &MacShare<F>, b: &MacShare<F>) -> MacShare<F> {
        MacShare {
            value: a.value + b.value,
            mac: a.mac + b.mac,
        }
    }

    fn sub(&self, a: &MacShare<F>, b: &MacShare<F>) -> MacShare<F> {
        MacShare {
            value: a.value - b.value,
            mac: a.mac - b.mac,
        }
    }

    fn mul_public(&self, a: &MacShare<F>, c: F) -> MacShare<F> {
        MacShare {
            value: a.value * c,
            mac: a.mac * c,
        }
    }

    fn add_public(&self, a: &MacShare<F>, c: F) -> MacShare<F> {
        // party 0 adds the constant, everyone authenticates it with their key share
        let value = if self.party == 0 { a.value + c } else { a.value };
        MacShare {
            value,
            mac: a.mac + self.alpha_i * c,
        }
    }

    fn open_part(&self, share: &MacShare<F>) -> F {
        share.value
    }

    fn reconstruct(&self, parts: &[F]) -> Result<F, Error> {
        Ok(parts.iter().copied().sum())
    }

    fn defer_check(
        &self,
        share: &MacShare<F>,
        _parts: Vec<F>,
        value: F,
        pending: &mut PendingChecks<F>,
    ) {
        pending.macs.push((value, share.mac));
    }

    fn mac_key_share(&self) -> Option<F> {
        Some(self.alpha_i)
    }
}

/// An additive share without MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditiveShare<F>(pub F);

/// Plain additive sharing, secure against semi-honest parties only.
#[derive(Debug, Clone)]
pub struct Additive<F> {
    party: usize,
    parties: usize,
    field: PhantomData<F>,
}

impl<F: Ring> Scheme for Additive<F> {
    type Ring = F;
    type Share = AdditiveShare<F>;

    const AUTHENTICATED: bool = false;

    fn threshold(_parties: usize, requested: Option<usize>) -> Result<Option<usize>, ConfigError> {
        no_threshold(requested)
    }

    fn new(state: SetupState<F>) -> Result<Self, Error> {
        Ok(Self {
            party: state.party,
            parties: state.parties,
            field: PhantomData,
        })
    }

    fn deal<R: Rng + ?Sized>(
        dealer: &DealerState<F>,
        secret: F,
        rng: &mut R,
    ) -> Vec<AdditiveShare<F>> {
        split(secret, dealer.parties, rng)
            .into_iter()
            .map(AdditiveShare)
            .collect()
    }

    fn party(&self) -> usize {
        self.party
    }

    fn parties(&self) -> usize {
        self.parties
    }

    fn zero(&self) -> AdditiveShare<F> {
        AdditiveShare(F::ZERO)
    }

    fn add(&self, a: &AdditiveShare<F>, b: &AdditiveShare<F>) -> AdditiveShare<F> {
        AdditiveShare(a.0 + b.0)
    }

    fn sub(&self, a: &AdditiveShare<F>, b: &AdditiveShare<F>) -> AdditiveShare<F> {
        AdditiveShare(a.0 - b.0)
    }

    fn mul_public(&self, a: &AdditiveShare<F>, c: F) -> AdditiveShare<F> {
        AdditiveShare(a.0 * c)
    }

    fn add_public(&self, a: &AdditiveShare<F>, c: F) -> AdditiveShare<F> {
        if self.party == 0 {
            AdditiveShare(a.0 + c)
        } else {
            *a
        }
    }

    fn open_part(&self, share: &AdditiveShare<F>) -> F {
        share.0
    }

    fn reconstruct(&self, parts: &[F]) -> Result<F, Error> {
        Ok(parts.iter().copied().sum())
    }

    fn defer_check(&self, _: &AdditiveShare<F>, _: Vec<F>, _: F, _: &mut PendingChecks<F>) {}
}

#[cfg(test)]
mod tests {
    use rand::rng;

    use super::*;
    use crate::field::{Gf61, Gf127};

    fn parties<S: Scheme>(n: usize, alphas: &[S::Ring]) -> Vec<S> {
        (0..n)
            .map(|party| {
                S::new(SetupState {
                    party,
                    parties: n,
                    threshold: None,
                    mac_key_share: alphas[party],
                })
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn macs_survive_linear_operations() {
        let mut rng = rng();
        let alphas: Vec<Gf127> = (0..3).map(|_| Gf127::random(&mut rng)).collect();
        let alpha: Gf127 = alphas.iter().copied().sum();
        let dealer = DealerState {
            parties: 3,
            threshold: None,
            mac_key: alpha,
        };
        let schemes = parties::<AdditiveMac<Gf127>>(3, &alphas);
        let x = AdditiveMac::deal(&dealer, Gf127::from(10), &mut rng);
        let y = AdditiveMac::deal(&dealer, Gf127::from(4), &mut rng);
        let z: Vec<_> = schemes
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let diff = s.sub(&x[i], &y[i]);
                s.add_public(&s.mul_public(&diff, Gf127::from(3)), Gf127::from(2))
            })
            .collect();
        let value: Gf127 = z.iter().map(|s| s.value).sum();
        let mac: Gf127 = z.iter().map(|s| s.mac).sum();
        assert_eq!(value, Gf127::from(20));
        assert_eq!(mac, alpha * value);
    }

    #[test]
    fn semi_honest_shares_sum_to_secret() {
        let mut rng = rng();
        let dealer = DealerState {
            parties: 4,
            threshold: None,
            mac_key: Gf61::ZERO,
        };
        let schemes = parties::<Additive<Gf61>>(4, &[Gf61::ZERO; 4]);
        let shares = Additive::deal(&dealer, Gf61::from(99), &mut rng);
        let shifted: Vec<Gf61> = schemes
            .iter()
            .zip(&shares)
            .map(|(s, share)| s.open_part(&s.add_public(share, Gf61::from(1))))
            .collect();
        assert_eq!(schemes[2].reconstruct(&shifted).unwrap(), Gf61::from(100));
    }

    #[test]
    fn threshold_is_rejected() {
        assert_eq!(AdditiveMac::<Gf127>::threshold(3, None), Ok(None));
        assert!(AdditiveMac::<Gf127>::threshold(3, Some(1)).is_err());
        assert!(Additive::<Gf127>::threshold(3, Some(1)).is_err());
    }
}
