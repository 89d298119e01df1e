//! Signer providers that live in this process.
//!
//! On Android the direct path goes through
//! [`ContentResolverProvider`](crate::bridge::android::ContentResolverProvider);
//! everywhere else a [`KeysProvider`] can stand in for the signer app.

pub mod keys;

pub use keys::KeysProvider;
