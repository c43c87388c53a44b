//! Credential checks performed by the authority during the handshake.

use super::envelope::Credentials;
use std::collections::HashMap;

/// Identity → secret table.
///
/// An [`open`](Self::open) store accepts everyone; use it for in-process
/// environments where authentication is moot.
#[derive(Clone, Default)]
pub struct CredentialStore {
    secrets: HashMap<String, String>,
    open: bool,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut identities: Vec<_> = self.secrets.keys().collect();
        identities.sort();
        f.debug_struct("CredentialStore")
            .field("identities", &identities)
            .field("open", &self.open)
            .finish()
    }
}

impl CredentialStore {
    /// A store that knows no identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that accepts any credentials.
    #[must_use]
    pub fn open() -> Self {
        Self {
            secrets: HashMap::new(),
            open: true,
        }
    }

    /// Adds an identity, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, credentials: Credentials) -> Self {
        self.insert(credentials);
        self
    }

    /// Adds or replaces an identity.
    pub fn insert(&mut self, credentials: Credentials) {
        self.secrets.insert(credentials.identity, credentials.secret);
    }

    /// Returns `true` if every identity is accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Checks `credentials`, returning the rejection reason on failure.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason that is sent back in `Rejected`.
    pub fn verify(&self, credentials: &Credentials) -> Result<(), String> {
        if self.open {
            return Ok(());
        }
        match self.secrets.get(&credentials.identity) {
            None => Err(format!("unknown identity '{}'", credentials.identity)),
            Some(secret) if *secret == credentials.secret => Ok(()),
            Some(_) => Err(format!("bad secret for '{}'", credentials.identity)),
        }
    }
}

impl FromIterator<Credentials> for CredentialStore {
    fn from_iter<I: IntoIterator<Item = Credentials>>(iter: I) -> Self {
        let mut store = Self::new();
        for credentials in iter {
            store.insert(credentials);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_store_accepts_anyone() {
        assert!(CredentialStore::open()
            .verify(&Credentials::new("who", "ever"))
            .is_ok());
    }

    #[test]
    fn closed_store_checks_secret() {
        let store: CredentialStore = [Credentials::new("count", "s3cret")].into_iter().collect();

        assert!(store.verify(&Credentials::new("count", "s3cret")).is_ok());
        let bad = store.verify(&Credentials::new("count", "nope")).unwrap_err();
        assert!(bad.contains("bad secret"));
        let unknown = store.verify(&Credentials::new("other", "s3cret")).unwrap_err();
        assert!(unknown.contains("unknown identity"));
    }

    #[test]
    fn debug_lists_identities_only() {
        let store = CredentialStore::new().with(Credentials::new("count", "s3cret"));
        let shown = format!("{store:?}");
        assert!(shown.contains("count"));
        assert!(!shown.contains("s3cret"));
    }
}
