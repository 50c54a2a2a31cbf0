//! # ChainConfess: Anonymous Confessions on a Confidential Chain
//!
//! Confessions are posted in the clear, but whether a confession is public
//! is submitted as an encrypted boolean and like counters are encrypted
//! on chain. Public like counts are readable by anyone; private ones only
//! by the sender and the recipient, through a signed decryption grant.
//!
//! The crate binds the ChainConfess contract ([`contract`]), offers an
//! in-process deployment for simulated networks ([`simulated`]) and wraps
//! both in per-account flows ([`session`]).
//!
//! The simulated fhEVM backend keeps its ciphertexts in memory, so it only
//! pairs with the in-process deployment. Against a real node use the relayer
//! backend.

pub mod addresses;
pub mod config;
pub mod contract;
pub mod error;
pub mod session;
pub mod simulated;

pub use error::{AppError, Result};
