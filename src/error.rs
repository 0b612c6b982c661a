//! Error taxonomy for the tree family.
//!
//! Every fallible operation returns one of four broad kinds: an I/O failure
//! from the underlying file, a corruption finding (the file's own bytes are
//! inconsistent with what the codec expects), a misuse of the API (opening a
//! tree twice, writing a DOT file with no key printer configured, operating
//! on a closed tree), or a bad argument (a key whose length does not match
//! the tree's record size, an order too small to satisfy the variant).

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors produced by the paged file, the page codec and the tree core.
#[derive(Error, Debug)]
pub enum TreeError {
    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file's bytes are inconsistent with what the codec expects.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// The API was used in a way its contract forbids.
    #[error("invalid operation: {0}")]
    Misuse(String),

    /// An argument failed validation.
    #[error("invalid argument: {0}")]
    Argument(String),
}

impl TreeError {
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::Misuse(msg.into())
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }
}
