//! File-backed persistence for a single structured value.
//! Values are stored as indented JSON, optionally sealed with a passphrase
//! (scrypt + AES-256-GCM), and replaced on disk with an atomic temp-file rename.

pub mod atomic;
pub mod cache;
pub mod crypto;
pub mod error;
pub mod store;

#[cfg(test)]
mod testing;

pub use cache::Cache;
pub use crypto::{decrypt_data, encrypt_data, CryptoError};
pub use error::StoreError;
pub use store::{Store, StoreOptions};
