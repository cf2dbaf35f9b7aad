//! # cimbar-rateless
//!
//! Rateless erasure codec for the cimbar visual transport.
//!
//! A message is split into `N` equal-size blocks (`2 <= N <= 64000`).  The
//! encoder derives a recovery set by solving a hybrid sparse/dense/heavy
//! GF(2) + GF(256) matrix, then produces any number of encoded blocks on
//! demand; the first `N` block ids reproduce the original data verbatim.
//! The decoder accepts blocks in any order and reconstructs the message
//! from (almost always) any `N` of them, occasionally needing a few more.
//!
//! ## Crate structure
//!
//! - [`gf256`] — GF(2^8) table context and bulk memory operations
//! - [`tables`] — compiled-in codec parameter tables and prime utilities
//! - [`Encoder`] / [`Decoder`] — the codec itself
//!
//! Call [`init`] once before constructing codecs; it builds the GF(256)
//! context and verifies the kernel on the running host.

pub mod gf256;
pub mod tables;

mod codec;
mod prng;
mod row;

pub use codec::{DecodeStatus, Decoder, Encoder};
pub use gf256::init;

use thiserror::Error;

/// Failure modes of the codec.
///
/// Recoverable flow control (`NeedMore`) is not an error; it is reported
/// through [`DecodeStatus`].  On any error the handle must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Empty message, zero block size, bad length, id out of range, or a
    /// reused id.
    #[error("invalid input")]
    InvalidInput,

    /// The message splits into fewer than 2 blocks.
    #[error("message needs at least 2 blocks")]
    TooFewBlocks,

    /// The message splits into more than 64000 blocks.
    #[error("message exceeds 64000 blocks")]
    TooManyBlocks,

    /// The parameter tables chose a non-invertible configuration.  Cannot
    /// happen for any supported block count with the shipped tables.
    #[error("peel seed failed to produce a solvable matrix")]
    BadPeelSeed,

    /// More than 32 rows beyond N arrived without completing the solve.
    #[error("extra row budget exhausted")]
    ExtraInsufficient,

    /// Workspace allocation failed.
    #[error("out of memory")]
    Oom,

    /// GF(256) init has not run, its self-test failed, or the host byte
    /// order is unexpected.
    #[error("unsupported platform")]
    UnsupportedPlatform,
}

pub(crate) fn try_zeroed_u8(len: usize) -> Result<Vec<u8>, CodecError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| CodecError::Oom)?;
    v.resize(len, 0);
    Ok(v)
}

pub(crate) fn try_zeroed_u64(len: usize) -> Result<Vec<u64>, CodecError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| CodecError::Oom)?;
    v.resize(len, 0);
    Ok(v)
}

pub(crate) fn try_filled_u16(len: usize, fill: u16) -> Result<Vec<u16>, CodecError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| CodecError::Oom)?;
    v.resize(len, fill);
    Ok(v)
}
