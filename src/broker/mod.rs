//! Credential broker
//!
//! Hands out bearer credentials for fetching a repository: the caller's own
//! GitHub token when their account is linked, otherwise an installation token
//! for the repository, gated on an active subscription and a collaborator
//! grant. Installation tokens are stored encrypted and renewed in place once
//! they get within [`EXPIRY_MARGIN_SECS`] of expiry.

mod session;

pub use session::{CurrentUser, Session, StaticSession};

use std::collections::HashMap;

use thiserror::Error;

use crate::crypto::{Cipher, CryptoError};
use crate::now_unix;
use crate::remote::{InstallationApi, RemoteError};
use crate::store::{CredentialStore, InstallationTokenRecord, StoreError};
use crate::types::RepoKey;

/// Stored installation tokens are treated as expired this long before their
/// real expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Errors returned by the credential broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("account is not linked to a GitHub identity")]
    NotLinked,

    #[error("no stored token for this account")]
    NotFound,

    #[error("app is not installed on {0}")]
    InstallationNotFound(String),

    #[error("stored credential could not be decrypted")]
    DecryptionFailed,

    #[error("no active subscription for {0}")]
    NoActiveSubscription(String),

    #[error("no permission to access {0}")]
    NoPermission(String),

    #[error("remote query failed: {0}")]
    RemoteQueryFailed(#[from] RemoteError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("encryption error: {0}")]
    Encryption(#[from] CryptoError),
}

/// Issues and renews credentials. Holds no per-request state; see
/// [`CredentialBroker::request`].
pub struct CredentialBroker<S, A, X> {
    store: S,
    api: A,
    cipher: X,
}

impl<S, A, X> CredentialBroker<S, A, X>
where
    S: CredentialStore,
    A: InstallationApi,
    X: Cipher,
{
    pub fn new(store: S, api: A, cipher: X) -> Self {
        Self { store, api, cipher }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn cipher(&self) -> &X {
        &self.cipher
    }

    /// Starts a unit of work for one caller. Results are memoized for the
    /// lifetime of the returned scope only.
    pub fn request<'a>(&'a self, session: &'a dyn Session) -> RequestScope<'a, S, A, X> {
        RequestScope {
            broker: self,
            session,
            user_tokens: HashMap::new(),
            installation_tokens: HashMap::new(),
            tokens: HashMap::new(),
        }
    }

    fn user_token_for(&self, user: &CurrentUser) -> Result<String, BrokerError> {
        if !user.is_linked() {
            return Err(BrokerError::NotLinked);
        }
        let sealed = self
            .store
            .user_token(&user.id)?
            .ok_or(BrokerError::NotFound)?;
        self.cipher
            .decrypt(&sealed)
            .ok_or(BrokerError::DecryptionFailed)
    }

    fn mint(&self, installation_id: u64) -> Result<(String, InstallationTokenRecord), BrokerError> {
        let minted = self.api.mint_installation_token(installation_id)?;
        let record = InstallationTokenRecord {
            installation_id,
            sealed: self.cipher.encrypt(&minted.token)?,
            expires_at: minted.expires_at,
        };
        Ok((minted.token, record))
    }

    /// Returns a live installation token for `key`, minting or renewing it
    /// as needed. Never memoized.
    pub fn installation_token(&self, key: &RepoKey) -> Result<String, BrokerError> {
        let installation_id = self
            .api
            .find_installation(key)?
            .ok_or_else(|| BrokerError::InstallationNotFound(key.to_string()))?;

        match self.store.installation_token(installation_id)? {
            None => {
                let (token, record) = self.mint(installation_id)?;
                self.store.insert_installation_token(&record)?;
                log::info!(
                    "minted installation token for {} (installation {})",
                    key,
                    installation_id
                );
                Ok(token)
            }
            Some(record) if now_unix() < record.expires_at - EXPIRY_MARGIN_SECS => self
                .cipher
                .decrypt(&record.sealed)
                .ok_or(BrokerError::DecryptionFailed),
            Some(_) => {
                let (token, record) = self.mint(installation_id)?;
                self.store.update_installation_token(&record)?;
                log::info!(
                    "renewed installation token for {} (installation {})",
                    key,
                    installation_id
                );
                Ok(token)
            }
        }
    }
}

/// Per-request view of the broker with memoized lookups.
///
/// Each retrieval is cached by its full argument tuple. Only successes are
/// kept; a failed lookup is retried if asked again. Dropping the scope
/// discards everything, so the next request re-checks expiry.
pub struct RequestScope<'a, S, A, X> {
    broker: &'a CredentialBroker<S, A, X>,
    session: &'a dyn Session,
    user_tokens: HashMap<String, String>,
    installation_tokens: HashMap<RepoKey, String>,
    tokens: HashMap<(String, RepoKey), String>,
}

impl<S, A, X> RequestScope<'_, S, A, X>
where
    S: CredentialStore,
    A: InstallationApi,
    X: Cipher,
{
    fn current_user(&self) -> Result<CurrentUser, BrokerError> {
        self.session
            .current_user()
            .ok_or(BrokerError::NotAuthenticated)
    }

    /// The caller's own linked GitHub token.
    pub fn user_token(&mut self) -> Result<String, BrokerError> {
        let user = self.current_user()?;
        if let Some(token) = self.user_tokens.get(&user.id) {
            return Ok(token.clone());
        }

        let token = self.broker.user_token_for(&user)?;
        self.user_tokens.insert(user.id, token.clone());
        Ok(token)
    }

    pub fn installation_token(&mut self, key: &RepoKey) -> Result<String, BrokerError> {
        if let Some(token) = self.installation_tokens.get(key) {
            return Ok(token.clone());
        }

        let token = self.broker.installation_token(key)?;
        self.installation_tokens.insert(key.clone(), token.clone());
        Ok(token)
    }

    /// Credential the caller should use to read `key`.
    ///
    /// Linked callers get their own token. Everyone else needs an active
    /// subscription for the owner and a collaborator grant on the repository,
    /// checked in that order before any remote call.
    pub fn token(&mut self, key: &RepoKey) -> Result<String, BrokerError> {
        let user = self.current_user()?;
        let memo_key = (user.id.clone(), key.clone());
        if let Some(token) = self.tokens.get(&memo_key) {
            return Ok(token.clone());
        }

        let token = if user.is_linked() {
            self.user_token()?
        } else {
            let store = &self.broker.store;
            if !store.has_active_subscription(key.owner.as_str())? {
                return Err(BrokerError::NoActiveSubscription(key.owner.to_string()));
            }
            if !store.has_collaborator_grant(&user.id, key.owner.as_str(), key.repo.as_str())? {
                return Err(BrokerError::NoPermission(key.to_string()));
            }
            self.installation_token(key)?
        };

        self.tokens.insert(memo_key, token.clone());
        Ok(token)
    }
}
