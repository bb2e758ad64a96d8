//! User directory and caller identity.
//!
//! The account system (registration, login, tokens) lives outside this
//! crate; the core consumes it through two narrow seams. [`AuthContext`]
//! carries the already-authenticated caller id, and [`UserDirectory`]
//! resolves user ids to key material.

use rand::{CryptoRng, RngCore};
use sealgram_crypto::{IdentityKeyPair, PublicIdentity};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{error::CoreError, record::UserId};

/// The authenticated caller of an operation.
///
/// Constructed by the (out-of-scope) auth layer after token validation;
/// the core trusts `user_id` unconditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// The verified caller id
    pub user_id: UserId,
}

impl AuthContext {
    /// Wrap an already-verified user id.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Resolves user ids to key material.
///
/// `private_keys` must only ever be called with the id from the caller's
/// own [`AuthContext`] — the core upholds this, and implementations may
/// enforce it again at their own boundary.
pub trait UserDirectory: Clone + Send + Sync + 'static {
    /// Public keys for a user. Fails with `NotFound` for unknown ids.
    fn public_keys(&self, user_id: &UserId) -> Result<PublicIdentity, CoreError>;

    /// Full keypair for a user, private halves included.
    fn private_keys(&self, user_id: &UserId) -> Result<IdentityKeyPair, CoreError>;
}

/// Directory holding identities in process memory.
///
/// Registration generates the keypairs, mirroring an account system that
/// creates a user's identity when the account is created.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<Mutex<HashMap<UserId, IdentityKeyPair>>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, generating a fresh identity.
    ///
    /// Fails with `AlreadyRegistered` if the id is taken; an identity is
    /// immutable once created.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn register<R: RngCore + CryptoRng>(
        &self,
        user_id: UserId,
        rng: &mut R,
    ) -> Result<PublicIdentity, CoreError> {
        let mut users = self.inner.lock().expect("Mutex poisoned");

        if users.contains_key(&user_id) {
            return Err(CoreError::AlreadyRegistered { user_id: user_id.to_string() });
        }

        let identity = IdentityKeyPair::generate(rng);
        let public = identity.public();
        users.insert(user_id, identity);

        Ok(public)
    }

    /// Register a user with a pre-built identity (key import, tests).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn register_identity(
        &self,
        user_id: UserId,
        identity: IdentityKeyPair,
    ) -> Result<PublicIdentity, CoreError> {
        let mut users = self.inner.lock().expect("Mutex poisoned");

        if users.contains_key(&user_id) {
            return Err(CoreError::AlreadyRegistered { user_id: user_id.to_string() });
        }

        let public = identity.public();
        users.insert(user_id, identity);

        Ok(public)
    }
}

impl UserDirectory for InMemoryDirectory {
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn public_keys(&self, user_id: &UserId) -> Result<PublicIdentity, CoreError> {
        let users = self.inner.lock().expect("Mutex poisoned");
        users
            .get(user_id)
            .map(IdentityKeyPair::public)
            .ok_or_else(|| CoreError::NotFound { kind: "user", id: user_id.to_string() })
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    fn private_keys(&self, user_id: &UserId) -> Result<IdentityKeyPair, CoreError> {
        let users = self.inner.lock().expect("Mutex poisoned");
        users
            .get(user_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound { kind: "user", id: user_id.to_string() })
    }
}
