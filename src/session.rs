use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
struct SessionEntry {
    principal: String,
    issued_at: DateTime<Utc>,
}

/// Token -> principal registry for logged-in users. Lives only in process
/// memory; tokens are never evicted, renewed or revoked.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mints an opaque token for the principal and records the session.
    /// Never fails; insertion happens atomically under the registry lock.
    pub fn create_session(&self, principal: &str) -> String {
        let token = generate_token();
        let entry = SessionEntry {
            principal: principal.to_string(),
            issued_at: Utc::now(),
        };
        log::debug!("issued session for `{}` at {}", entry.principal, entry.issued_at);
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(token.clone(), entry);
        token
    }

    /// True iff the token was issued by this registry. Absent or malformed
    /// tokens are simply invalid, never an error.
    pub fn is_valid(&self, token: &str) -> bool {
        self.sessions
            .read()
            .map(|sessions| sessions.contains_key(token))
            .unwrap_or(false)
    }
}

fn generate_token() -> String {
    let seed: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(seed);
    hex::encode(hasher.finalize())
}
