//! offline-mt - Offline Machine Translation
//!
//! Provisions large model assets (download, verify, extract, install; every
//! stage resumable) and dispatches translation requests across an ordered
//! chain of backends that fall back to each other on failure.

pub mod assets;
pub mod cli;
pub mod config;
pub mod error;
pub mod translate;
