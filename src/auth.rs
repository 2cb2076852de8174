//! Authentication seam and role checks.
//!
//! `AuthProvider` is the session source. Authorization goes through
//! `authorize` only: access depends on role claims carried by the identity,
//! never on who the email address belongs to.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::ids::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

/// A signed-in principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub roles: Vec<Role>,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("not signed in")]
    NotSignedIn,

    #[error("missing role: {0:?}")]
    MissingRole(Role),

    #[error("account already exists: {0}")]
    AlreadyRegistered(String),

    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current(&self) -> Option<Identity>;

    /// Session changes, starting from the current value.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// The single authorization check. Returns the identity when it holds `role`.
pub fn authorize(identity: Option<&Identity>, role: Role) -> Result<&Identity, AuthError> {
    let identity = identity.ok_or(AuthError::NotSignedIn)?;
    if identity.has_role(role) {
        Ok(identity)
    } else {
        log::warn!("{} lacks role {:?}", identity.uid, role);
        Err(AuthError::MissingRole(role))
    }
}

// ---------------------------------------------------------------------------
// Local provider
// ---------------------------------------------------------------------------

struct Credential {
    identity: Identity,
    digest: String,
}

/// In-process credential table with SHA-256 password digests.
pub struct LocalAuthProvider {
    accounts: Mutex<HashMap<String, Credential>>,
    session: watch::Sender<Option<Identity>>,
}

impl Default for LocalAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuthProvider {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session,
        }
    }

    /// Create an account. Emails are matched case-insensitively.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        roles: Vec<Role>,
    ) -> Result<Identity, AuthError> {
        let key = normalize_email(email);
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&key) {
            return Err(AuthError::AlreadyRegistered(key));
        }

        let identity = Identity {
            uid: generate_id("user"),
            email: key.clone(),
            roles,
        };
        let digest = password_digest(&identity.uid, password);
        accounts.insert(
            key,
            Credential {
                identity: identity.clone(),
                digest,
            },
        );
        log::info!("Registered account {}", identity.uid);
        Ok(identity)
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let identity = {
            let accounts = self.accounts.lock();
            let credential = accounts
                .get(&normalize_email(email))
                .ok_or(AuthError::InvalidCredentials)?;
            if password_digest(&credential.identity.uid, password) != credential.digest {
                return Err(AuthError::InvalidCredentials);
            }
            credential.identity.clone()
        };

        self.session.send_replace(Some(identity.clone()));
        log::info!("Signed in {}", identity.uid);
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(previous) = self.session.send_replace(None) {
            log::info!("Signed out {}", previous.uid);
        }
        Ok(())
    }

    fn current(&self) -> Option<Identity> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hex SHA-256 of `uid:password`. The uid acts as a per-account salt.
fn password_digest(uid: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uid.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_and_out_publishes_session() {
        let auth = LocalAuthProvider::new();
        auth.register("Owner@Salon.com", "s3cret", vec![Role::Admin])
            .expect("register");
        let mut rx = auth.subscribe();
        assert!(rx.borrow().is_none());

        let identity = auth.sign_in("owner@salon.com", "s3cret").await.expect("sign in");
        assert_eq!(identity.email, "owner@salon.com");
        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&identity));
        assert_eq!(auth.current(), Some(identity));

        auth.sign_out().await.expect("sign out");
        assert!(auth.current().is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let auth = LocalAuthProvider::new();
        auth.register("a@b.com", "right", vec![Role::Customer])
            .expect("register");
        assert!(matches!(
            auth.sign_in("a@b.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in("nobody@b.com", "right").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(auth.current().is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let auth = LocalAuthProvider::new();
        auth.register("a@b.com", "x", vec![]).expect("register");
        assert!(matches!(
            auth.register(" A@B.com ", "y", vec![]),
            Err(AuthError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_authorize_uses_role_claims() {
        let customer = Identity {
            uid: "u1".into(),
            email: "admin@salon.com".into(),
            roles: vec![Role::Customer],
        };
        assert!(matches!(
            authorize(Some(&customer), Role::Admin),
            Err(AuthError::MissingRole(Role::Admin))
        ));
        assert!(authorize(Some(&customer), Role::Customer).is_ok());
        assert!(matches!(
            authorize(None, Role::Customer),
            Err(AuthError::NotSignedIn)
        ));
    }

    #[test]
    fn test_digest_is_salted() {
        assert_ne!(password_digest("u1", "pw"), password_digest("u2", "pw"));
        assert_eq!(password_digest("u1", "pw").len(), 64);
    }
}
