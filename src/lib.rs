//! Secure multi-party dot products over pluggable secret-sharing schemes.
//!
//! Every party holds a private vector. The parties secret-share their inputs, multiply them
//! pairwise using preprocessed Beaver triples and sum the products into a single shared value,
//! which is opened to everyone only after its integrity has been verified. All products of a dot
//! product are computed in a single communication round, independent of the vector length.
//!
//! ## Backends
//!
//! The sharing backend is selected at runtime with [`protocol::Protocol`]:
//!
//! * `MASCOT`: additive sharing with information-theoretic MACs (SPDZ-style) over `GF(2^127 - 1)`
//! * `CowGear`: the same over the smaller field `GF(2^61 - 1)`
//! * `SPDZ2k`: the same over the ring `Z/2^128`, computing modulo `2^64`
//! * `Semi`: additive sharing without MACs, for semi-honest parties
//! * `Semi2k`: additive sharing without MACs over `Z/2^64`
//! * `Shamir`: threshold sharing with an honest majority (`2t < n`)
//! * `MalShamir`: threshold sharing that detects inconsistent openings
//!
//! ## Main Components
//!
//! * [`setup`]: run-wide state, created once per party and shared by all protocols.
//! * [`input`], [`mul`] and [`output`]: the input, dot product and open protocols, each an explicit
//!   state machine with a single `exchange` round.
//! * [`preprocessing`] and [`dealer`]: sources of triples and input masks.
//! * [`channel`]: communication abstractions for exchanging data between parties.
//!
//! ## Basic Usage
//!
//! Every party calls [`protocol::Protocol::dot_product`] with its own channel and inputs. For
//! tests and development, [`protocol::simulate_dot_product`] runs all parties in one task:
//!
//! ```
//! use polyshare::{preprocessing::Preprocessor, protocol::{Protocol, simulate_dot_product}};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), polyshare::Error> {
//! let inputs = vec![vec![1, 2, 3], vec![4, 5, 6]];
//! let results =
//!     simulate_dot_product(Protocol::Mascot, None, Preprocessor::SharedSeed, &inputs).await?;
//! assert_eq!(results, vec![32, 32]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! With MAC-authenticated sharing, a deviating party is detected by the checks with overwhelming
//! probability, and [`Error::Integrity`] is returned instead of a result. The
//! [`preprocessing::Preprocessor::SharedSeed`] source reveals all shares to all parties and must
//! only be used for testing the online phase.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod dealer;
pub mod error;
pub mod field;
pub mod input;
pub mod mul;
pub mod output;
pub mod preprocessing;
pub mod protocol;
pub mod setup;
pub mod sharing;

mod check;
mod consensus;

pub use error::Error;
