//! # cimbar-stream
//!
//! Framed byte streams over the cimbar rateless codec, plus the small
//! envelope and index utilities the visual layer needs around them.
//!
//! ## Crate structure
//!
//! - [`frame`] — the 6-byte packet header shared by both stream ends
//! - [`FountainEncoderStream`] — packetizes a payload into a continuous
//!   byte stream readable in arbitrary chunk sizes
//! - [`FountainDecoderStream`] — reassembles packets from arbitrary
//!   chunks and feeds the codec until the payload is recovered
//! - [`envelope`] — skippable-frame helpers carrying out-of-band metadata
//! - [`interleave`] — partitioned round-robin index permutation
//!
//! Any permutation of the encoder's packets, split into any chunk sizes,
//! eventually yields the exact original payload on the decoder side.

pub mod envelope;
pub mod frame;
pub mod interleave;

mod decoder_stream;
mod encoder_stream;

pub use decoder_stream::FountainDecoderStream;
pub use encoder_stream::FountainEncoderStream;

// The codec is part of this crate's public surface
pub use cimbar_rateless::{CodecError, DecodeStatus, Decoder, Encoder};
