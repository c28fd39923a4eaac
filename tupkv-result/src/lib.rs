//! Error types and result definitions for the tupkv storage engine.
//!
//! All tupkv crates share a single error enum ([`Error`]) and result type
//! alias ([`Result<T>`]). Operations that can fail return `Result<T>` and
//! propagate errors with the `?` operator; callers can match on specific
//! variants for programmatic handling.
//!
//! # Error Categories
//!
//! - **Input errors** ([`Error::InvalidUri`], [`Error::UnknownObjectClass`],
//!   [`Error::EmptyPage`]): the caller handed us something unusable.
//! - **Driver errors** ([`Error::WriteFailed`], [`Error::ReadFailed`]): the
//!   KV object-store driver returned a non-zero status. The core retries
//!   nothing; transient transport handling is the driver's business.
//! - **Storage-format errors** ([`Error::AnchorTooShort`],
//!   [`Error::AnchorDecodeFailed`], [`Error::Corrupt`]): bytes read back
//!   from the store do not match what the format requires.
//! - **Ambient errors** ([`Error::Io`], [`Error::NotFound`],
//!   [`Error::Internal`]): everything else.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
