//! Content hashing for dcache.
//!
//! Provides domain-separated BLAKE3 digests. The local snapshot store names
//! its files after the 128-bit digest of a type's qualified name, so the name
//! must be stable across processes and releases.
//!
//! All crypto operations wrap established libraries — no custom cryptography.

pub mod hasher;

pub use hasher::{ContentHasher, Digest128};
