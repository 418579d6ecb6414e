//! Threshold (Shamir) sharing.
//!
//! Party `i` holds the evaluation of a random polynomial of degree `t` at `x = i + 1`, the secret
//! is the free coefficient. Opened values are reconstructed from the first `t + 1` points. The
//! malicious variant additionally records every opened point set and, on check, verifies that all
//! points lie on the interpolated polynomial, which detects (but does not correct) up to `t`
//! deviating parties as long as `2t < n`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{ConfigError, Error, IntegrityError},
    field::Field,
    sharing::{DealerState, PendingChecks, Scheme, SetupState},
};

/// The evaluation of the sharing polynomial at the point of `party`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShamirShare<F> {
    /// The index of the party holding the share, its evaluation point is `party + 1`.
    pub party: usize,
    /// The value of the polynomial at the evaluation point.
    pub y: F,
}

/// Shamir sharing. With `MALICIOUS` set, every opening is checked for consistency.
#[derive(Debug, Clone)]
pub struct Shamir<F, const MALICIOUS: bool> {
    party: usize,
    parties: usize,
    threshold: usize,
    /// Lagrange coefficients of the points `1..=t+1` for the evaluation at zero.
    coefficients: Vec<F>,
}

/// Shamir sharing for honest majorities of semi-honest parties.
pub type SemiShamir<F> = Shamir<F, false>;

/// Shamir sharing with detection of inconsistent openings.
pub type MalShamir<F> = Shamir<F, true>;

/// The evaluation point of a party.
pub fn point<F: Field>(party: usize) -> F {
    F::from_u128(party as u128 + 1)
}

/// Computes the Lagrange coefficients of the points `xs` for an evaluation at `at`.
///
/// Returns `None` if two points coincide.
pub fn lagrange_coefficients<F: Field>(xs: &[F], at: F) -> Option<Vec<F>> {
    xs.iter()
        .enumerate()
        .map(|(k, &xk)| {
            let mut num = F::ONE;
            let mut den = F::ONE;
            for (m, &xm) in xs.iter().enumerate() {
                if m != k {
                    num *= at - xm;
                    den *= xk - xm;
                }
            }
            den.inv().map(|inv| num * inv)
        })
        .collect()
}

/// Evaluates the polynomial through `points` at `at`.
pub fn interpolate<F: Field>(points: &[(F, F)], at: F) -> Option<F> {
    let xs: Vec<F> = points.iter().map(|(x, _)| *x).collect();
    let coefficients = lagrange_coefficients(&xs, at)?;
    Some(coefficients.iter().zip(points).map(|(c, (_, y))| *c * *y).sum())
}

/// Checks that all points lie on the polynomial of degree `threshold` through the first
/// `threshold + 1` of them and returns its free coefficient.
pub fn reconstruct_checked<F: Field>(
    points: &[(F, F)],
    threshold: usize,
) -> Result<F, IntegrityError> {
    if points.len() <= threshold {
        return Err(IntegrityError::InconsistentShares(1));
    }
    let (base, rest) = points.split_at(threshold + 1);
    let secret = interpolate(base, F::ZERO).ok_or(IntegrityError::InconsistentShares(1))?;
    for (x, y) in rest {
        let expected = interpolate(base, *x).ok_or(IntegrityError::InconsistentShares(1))?;
        if !bool::from(expected.ct_eq(y)) {
            return Err(IntegrityError::InconsistentShares(1));
        }
    }
    Ok(secret)
}

impl<F: Field, const MALICIOUS: bool> Scheme for Shamir<F, MALICIOUS> {
    type Ring = F;
    type Share = ShamirShare<F>;

    const AUTHENTICATED: bool = false;

    fn threshold(parties: usize, requested: Option<usize>) -> Result<Option<usize>, ConfigError> {
        let threshold = requested.unwrap_or(parties.saturating_sub(1) / 2);
        if 2 * threshold >= parties {
            Err(ConfigError::ThresholdTooLarge { threshold, parties })
        } else {
            Ok(Some(threshold))
        }
    }

    fn new(state: SetupState<F>) -> Result<Self, Error> {
        let threshold = Self::threshold(state.parties, state.threshold)?.unwrap_or(1);
        if threshold == 0 {
            warn!("with threshold 0 every party holds all secrets in the clear");
        }
        if (state.parties as u128) >= F::MODULUS {
            return Err(ConfigError::FieldTooSmall(state.parties).into());
        }
        let xs: Vec<F> = (0..=threshold).map(point).collect();
        let coefficients = lagrange_coefficients(&xs, F::ZERO)
            .ok_or(ConfigError::FieldTooSmall(state.parties))?;
        Ok(Self {
            party: state.party,
            parties: state.parties,
            threshold,
            coefficients,
        })
    }

    fn deal<R: Rng + ?Sized>(
        dealer: &DealerState<F>,
        secret: F,
        rng: &mut R,
    ) -> Vec<ShamirShare<F>> {
        let degree = dealer.threshold.unwrap_or(1);
        let coefficients: Vec<F> = (0..degree).map(|_| F::random(rng)).collect();
        (0..dealer.parties)
            .map(|party| {
                let x = point::<F>(party);
                // Horner, highest coefficient first
                let y = coefficients
                    .iter()
                    .rev()
                    .fold(F::ZERO, |acc, c| acc * x + *c);
                ShamirShare {
                    party,
                    y: y * x + secret,
                }
            })
            .collect()
    }

    fn party(&self) -> usize {
        self.party
    }

    fn parties(&self) -> usize {
        self.parties
    }

    fn zero(&self) -> ShamirShare<F> {
        ShamirShare {
            party: self.party,
            y: F::ZERO,
        }
    }

    fn add(&self, a: &ShamirShare<F>, b: &ShamirShare<F>) -> ShamirShare<F> {
        ShamirShare {
            party: self.party,
            y: a.y + b.y,
        }
    }

    fn sub(&self, a: &ShamirShare<F>, b: &ShamirShare<F>) -> ShamirShare<F> {
        ShamirShare {
            party: self.party,
            y: a.y - b.y,
        }
    }

    fn mul_public(&self, a: &ShamirShare<F>, c: F) -> ShamirShare<F> {
        ShamirShare {
            party: self.party,
            y: a.y * c,
        }
    }

    fn add_public(&self, a: &ShamirShare<F>, c: F) -> ShamirShare<F> {
        // a constant is a polynomial of degree 0, every point moves by it
        ShamirShare {
            party: self.party,
            y: a.y + c,
        }
    }

    fn open_part(&self, share: &ShamirShare<F>) -> F {
        share.y
    }

    fn reconstruct(&self, parts: &[F]) -> Result<F, Error> {
        if parts.len() <= self.threshold {
            return Err(IntegrityError::InconsistentShares(1).into());
        }
        Ok(self
            .coefficients
            .iter()
            .zip(parts)
            .map(|(c, y)| *c * *y)
            .sum())
    }

    fn defer_check(
        &self,
        _share: &ShamirShare<F>,
        parts: Vec<F>,
        _value: F,
        pending: &mut PendingChecks<F>,
    ) {
        if MALICIOUS {
            pending.openings.push(parts);
        }
    }

    fn verify_openings(&self, openings: &[Vec<F>]) -> Result<(), IntegrityError> {
        let inconsistent = openings
            .iter()
            .filter(|parts| {
                let points: Vec<(F, F)> = parts
                    .iter()
                    .enumerate()
                    .map(|(k, y)| (point(k), *y))
                    .collect();
                reconstruct_checked(&points, self.threshold).is_err()
            })
            .count();
        if inconsistent == 0 {
            Ok(())
        } else {
            Err(IntegrityError::InconsistentShares(inconsistent))
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rng};
    use rand_chacha::ChaCha20Rng;

    use super::*;
    use crate::field::{Gf61, Gf127, Ring};

    fn dealer(parties: usize, threshold: usize) -> DealerState<Gf127> {
        DealerState {
            parties,
            threshold: Some(threshold),
            mac_key: Gf127::ZERO,
        }
    }

    fn scheme<const M: bool>(party: usize, parties: usize, t: usize) -> Shamir<Gf127, M> {
        Shamir::new(SetupState {
            party,
            parties,
            threshold: Some(t),
            mac_key_share: Gf127::ZERO,
        })
        .unwrap()
    }

    #[test]
    fn threshold_rules() {
        assert_eq!(SemiShamir::<Gf127>::threshold(3, None), Ok(Some(1)));
        assert_eq!(SemiShamir::<Gf127>::threshold(7, None), Ok(Some(3)));
        assert_eq!(
            SemiShamir::<Gf127>::threshold(3, Some(2)),
            Err(ConfigError::ThresholdTooLarge {
                threshold: 2,
                parties: 3
            })
        );
        assert_eq!(MalShamir::<Gf127>::threshold(2, None), Ok(Some(0)));
        assert_eq!(MalShamir::<Gf127>::threshold(5, Some(0)), Ok(Some(0)));
    }

    #[test]
    fn every_minimal_subset_reconstructs() {
        let mut rng = rng();
        let (n, t) = (5, 2);
        let secret = Gf127::from(1234);
        let shares = Shamir::<Gf127, false>::deal(&dealer(n, t), secret, &mut rng);
        for a in 0..n {
            for b in a + 1..n {
                for c in b + 1..n {
                    let points: Vec<_> = [a, b, c]
                        .iter()
                        .map(|&k| (point(k), shares[k].y))
                        .collect();
                    assert_eq!(interpolate(&points, Gf127::ZERO), Some(secret));
                }
            }
        }
    }

    #[test]
    fn inconsistent_points_are_detected() {
        let mut rng = rng();
        let (n, t) = (5, 2);
        let shares = Shamir::<Gf127, true>::deal(&dealer(n, t), Gf127::from(7), &mut rng);
        let mut points: Vec<_> = shares.iter().map(|s| (point(s.party), s.y)).collect();
        assert_eq!(reconstruct_checked(&points, t), Ok(Gf127::from(7)));
        points[4].1 += Gf127::ONE;
        assert_eq!(
            reconstruct_checked(&points, t),
            Err(IntegrityError::InconsistentShares(1))
        );

        let s = scheme::<true>(0, n, t);
        let mut parts: Vec<Gf127> = shares.iter().map(|s| s.y).collect();
        assert!(s.verify_openings(&[parts.clone()]).is_ok());
        parts[0] -= Gf127::ONE;
        assert_eq!(
            s.verify_openings(&[parts.clone(), parts]),
            Err(IntegrityError::InconsistentShares(2))
        );
    }

    #[test]
    fn only_malicious_variant_records_openings() {
        let mut pending = PendingChecks::default();
        let semi = scheme::<false>(1, 3, 1);
        semi.defer_check(&semi.zero(), vec![Gf127::ONE; 3], Gf127::ONE, &mut pending);
        assert!(pending.is_empty());
        let mal = scheme::<true>(1, 3, 1);
        mal.defer_check(&mal.zero(), vec![Gf127::ONE; 3], Gf127::ONE, &mut pending);
        assert_eq!(pending.openings.len(), 1);
    }

    #[test]
    fn public_constants_shift_the_secret() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let d = DealerState {
            parties: 3,
            threshold: Some(1),
            mac_key: Gf61::ZERO,
        };
        let shares = MalShamir::<Gf61>::deal(&d, Gf61::from(5), &mut rng);
        let schemes: Vec<MalShamir<Gf61>> = (0..3)
            .map(|party| {
                Shamir::new(SetupState {
                    party,
                    parties: 3,
                    threshold: Some(1),
                    mac_key_share: Gf61::ZERO,
                })
                .unwrap()
            })
            .collect();
        let parts: Vec<Gf61> = schemes
            .iter()
            .zip(&shares)
            .map(|(s, share)| {
                let scaled = s.mul_public(share, Gf61::from(3));
                s.open_part(&s.add_public(&scaled, Gf61::from(2)))
            })
            .collect();
        assert_eq!(schemes[0].reconstruct(&parts).unwrap(), Gf61::from(17));
        assert!(schemes[0].verify_openings(&[parts]).is_ok());
    }

    proptest! {
        #[test]
        fn shares_reconstruct(secret in 0..u128::MAX, seed in any::<u64>(), n in 3usize..9) {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let t = (n - 1) / 2;
            let secret = Gf127::from_u128(secret);
            let shares = Shamir::<Gf127, true>::deal(&dealer(n, t), secret, &mut rng);
            let parts: Vec<Gf127> = shares.iter().map(|s| s.y).collect();
            let s = scheme::<true>(0, n, t);
            prop_assert_eq!(s.reconstruct(&parts).unwrap(), secret);
            prop_assert!(s.verify_openings(&[parts]).is_ok());
        }
    }
}
