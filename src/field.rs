//! The rings all secret-shared values live in.
//!
//! The prime fields use a Mersenne prime modulus, so reduction after a multiplication is a shift
//! and an addition instead of a division. The rings `Z2k` of integers modulo a power of two reduce
//! by masking and carry the plaintext in their low-order bits.

use std::{
    fmt,
    hash::Hash,
    iter::Sum,
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use rand::Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use subtle::{Choice, ConstantTimeEq};

/// An element of a commutative ring with a canonical `u128` representation.
pub trait Ring:
    Copy
    + fmt::Debug
    + fmt::Display
    + Default
    + Eq
    + Hash
    + ConstantTimeEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + Sum
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The additive identity.
    const ZERO: Self;
    /// The multiplicative identity.
    const ONE: Self;
    /// The bit length of the canonical representatives.
    const BITS: u32;
    /// The number of low-order bits that carry the plaintext, `None` if the whole element does.
    const PLAINTEXT_BITS: Option<u32> = None;

    /// Maps an integer to the ring by reducing it.
    fn from_u128(v: u128) -> Self;

    /// Returns the canonical representative.
    fn to_u128(self) -> u128;

    /// Samples a uniformly random element.
    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self;

    /// The plaintext an opened element stands for.
    fn plaintext(self) -> u128 {
        match Self::PLAINTEXT_BITS {
            Some(bits) if bits < 128 => self.to_u128() & ((1 << bits) - 1),
            _ => self.to_u128(),
        }
    }

    /// Raises the element to the power `e`.
    fn pow(self, mut e: u128) -> Self {
        let mut base = self;
        let mut acc = Self::ONE;
        while e > 0 {
            if e & 1 == 1 {
                acc *= base;
            }
            base *= base;
            e >>= 1;
        }
        acc
    }
}

/// An element of a prime field.
pub trait Field: Ring {
    /// The prime modulus.
    const MODULUS: u128;

    /// Returns the multiplicative inverse, or `None` for zero.
    fn inv(self) -> Option<Self> {
        if self == Self::ZERO {
            None
        } else {
            Some(self.pow(Self::MODULUS - 2))
        }
    }
}

/// Generates the operator impls shared by all rings.
macro_rules! ring_ops {
    (impl[$($gen:tt)*] $name:ty) => {
        impl<$($gen)*> AddAssign for $name {
            fn add_assign(&mut self, rhs: Self) {
                *self = *self + rhs;
            }
        }

        impl<$($gen)*> SubAssign for $name {
            fn sub_assign(&mut self, rhs: Self) {
                *self = *self - rhs;
            }
        }

        impl<$($gen)*> MulAssign for $name {
            fn mul_assign(&mut self, rhs: Self) {
                *self = *self * rhs;
            }
        }

        impl<$($gen)*> Neg for $name {
            type Output = Self;

            fn neg(self) -> Self {
                Self::ZERO - self
            }
        }

        impl<$($gen)*> Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, |acc, x| acc + x)
            }
        }

        impl<$($gen)*> ConstantTimeEq for $name {
            fn ct_eq(&self, other: &Self) -> Choice {
                self.0.to_le_bytes()[..].ct_eq(&other.0.to_le_bytes()[..])
            }
        }

        impl<$($gen)*> fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl<$($gen)*> From<u32> for $name {
            fn from(v: u32) -> Self {
                Self::from_u128(v as u128)
            }
        }
    };
}

/// An element of the prime field modulo the Mersenne prime `2^127 - 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u128", into = "u128")]
pub struct Gf127(u128);

const P127: u128 = (1 << 127) - 1;

impl Gf127 {
    /// Folds a value below `2^128` into `0..P127`.
    fn reduce(v: u128) -> u128 {
        let r = (v & P127) + (v >> 127);
        if r >= P127 { r - P127 } else { r }
    }
}

impl Field for Gf127 {
    const MODULUS: u128 = P127;
}

impl Ring for Gf127 {
    const ZERO: Self = Gf127(0);
    const ONE: Self = Gf127(1);
    const BITS: u32 = 127;

    fn from_u128(v: u128) -> Self {
        Gf127(Self::reduce(v))
    }

    fn to_u128(self) -> u128 {
        self.0
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let v = rng.random::<u128>() & P127;
            if v != P127 {
                return Gf127(v);
            }
        }
    }
}

impl Add for Gf127 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Gf127(Self::reduce(self.0 + rhs.0))
    }
}

impl Sub for Gf127 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        if self.0 >= rhs.0 {
            Gf127(self.0 - rhs.0)
        } else {
            Gf127(self.0 + (P127 - rhs.0))
        }
    }
}

impl Mul for Gf127 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let (a0, a1) = (self.0 as u64 as u128, self.0 >> 64);
        let (b0, b1) = (rhs.0 as u64 as u128, rhs.0 >> 64);
        // both operands are below 2^127, so neither `mid` nor `hi` can overflow
        let lo = a0 * b0;
        let mid = a0 * b1 + a1 * b0;
        let hi = a1 * b1;
        let (lo, carry) = lo.overflowing_add(mid << 64);
        let hi = hi + (mid >> 64) + carry as u128;
        // 2^128 = 2 mod P127
        let lo = Self::reduce(lo);
        let hi = Self::reduce(hi << 1);
        Gf127(Self::reduce(lo + hi))
    }
}

impl TryFrom<u128> for Gf127 {
    type Error = String;

    fn try_from(v: u128) -> Result<Self, Self::Error> {
        if v < P127 {
            Ok(Gf127(v))
        } else {
            Err(format!("{v} is not a canonical element of GF(2^127 - 1)"))
        }
    }
}

impl From<Gf127> for u128 {
    fn from(v: Gf127) -> Self {
        v.0
    }
}

ring_ops!(impl[] Gf127);

/// An element of the prime field modulo the Mersenne prime `2^61 - 1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Gf61(u64);

const P61: u64 = (1 << 61) - 1;

impl Gf61 {
    fn reduce(v: u64) -> u64 {
        let r = (v & P61) + (v >> 61);
        if r >= P61 { r - P61 } else { r }
    }
}

impl Field for Gf61 {
    const MODULUS: u128 = P61 as u128;
}

impl Ring for Gf61 {
    const ZERO: Self = Gf61(0);
    const ONE: Self = Gf61(1);
    const BITS: u32 = 61;

    fn from_u128(v: u128) -> Self {
        Gf61((v % P61 as u128) as u64)
    }

    fn to_u128(self) -> u128 {
        self.0 as u128
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let v = rng.random::<u64>() & P61;
            if v != P61 {
                return Gf61(v);
            }
        }
    }
}

impl Add for Gf61 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Gf61(Self::reduce(self.0 + rhs.0))
    }
}

impl Sub for Gf61 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        if self.0 >= rhs.0 {
            Gf61(self.0 - rhs.0)
        } else {
            Gf61(self.0 + (P61 - rhs.0))
        }
    }
}

impl Mul for Gf61 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let prod = self.0 as u128 * rhs.0 as u128;
        let folded = (prod & P61 as u128) as u64 + (prod >> 61) as u64;
        Gf61(Self::reduce(folded))
    }
}

impl TryFrom<u64> for Gf61 {
    type Error = String;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        if v < P61 {
            Ok(Gf61(v))
        } else {
            Err(format!("{v} is not a canonical element of GF(2^61 - 1)"))
        }
    }
}

impl From<Gf61> for u64 {
    fn from(v: Gf61) -> Self {
        v.0
    }
}

ring_ops!(impl[] Gf61);

/// An element of the ring of integers modulo `2^(K + S)` whose plaintext is the low `K` bits.
///
/// The `S` upper bits are the security margin of SPDZ2k MACs, plain ring sharing uses `S = 0`.
/// `K + S` must not exceed 128.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u128", into = "u128")]
pub struct Z2k<const K: u32, const S: u32>(u128);

impl<const K: u32, const S: u32> Z2k<K, S> {
    const MASK: u128 = u128::MAX >> (128 - (K + S));
}

impl<const K: u32, const S: u32> Ring for Z2k<K, S> {
    const ZERO: Self = Z2k(0);
    const ONE: Self = Z2k(1);
    const BITS: u32 = K + S;
    const PLAINTEXT_BITS: Option<u32> = Some(K);

    fn from_u128(v: u128) -> Self {
        Z2k(v & Self::MASK)
    }

    fn to_u128(self) -> u128 {
        self.0
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Z2k(rng.random::<u128>() & Self::MASK)
    }
}

impl<const K: u32, const S: u32> Add for Z2k<K, S> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Z2k(self.0.wrapping_add(rhs.0) & Self::MASK)
    }
}

impl<const K: u32, const S: u32> Sub for Z2k<K, S> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Z2k(self.0.wrapping_sub(rhs.0) & Self::MASK)
    }
}

impl<const K: u32, const S: u32> Mul for Z2k<K, S> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Z2k(self.0.wrapping_mul(rhs.0) & Self::MASK)
    }
}

impl<const K: u32, const S: u32> TryFrom<u128> for Z2k<K, S> {
    type Error = String;

    fn try_from(v: u128) -> Result<Self, Self::Error> {
        if v & !Self::MASK == 0 {
            Ok(Z2k(v))
        } else {
            Err(format!("{v} is not a canonical element of Z/2^{}", K + S))
        }
    }
}

impl<const K: u32, const S: u32> From<Z2k<K, S>> for u128 {
    fn from(v: Z2k<K, S>) -> Self {
        v.0
    }
}

ring_ops!(impl[const K: u32, const S: u32] Z2k<K, S>);
