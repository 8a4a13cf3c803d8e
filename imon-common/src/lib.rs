//! # imon Common Library
//!
//! Shared code for the imon donation services including:
//! - Error and result types
//! - Configuration file discovery and root folder resolution
//! - The immutable label wordlist
//! - Injectable randomness (identifiers, sampling)
//! - Utility functions

pub mod config;
pub mod error;
pub mod random;
pub mod time;
pub mod uuid_utils;
pub mod wordlist;

pub use error::{Error, Result};
pub use random::{RandomSource, SeededRandom, ThreadRandom};
pub use wordlist::Wordlist;
