//! Process-wide registry of live call sessions
//!
//! At most one controller may own a given call id. A `SessionClaim` is held
//! for the controller's lifetime and releases the id on drop.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use voicematch_core::{ClientError, ClientResult};

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `call_id` for one controller
    pub fn claim(&self, call_id: &str) -> ClientResult<SessionClaim> {
        let mut active = self.active.lock();
        if !active.insert(call_id.to_string()) {
            return Err(ClientError::SessionInUse(call_id.to_string()));
        }
        debug!("Session claimed: {}", call_id);

        Ok(SessionClaim {
            registry: self.clone(),
            call_id: call_id.to_string(),
        })
    }

    pub fn is_active(&self, call_id: &str) -> bool {
        self.active.lock().contains(call_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

/// Ownership of one call id; released on drop
#[derive(Debug)]
pub struct SessionClaim {
    registry: SessionRegistry,
    call_id: String,
}

impl SessionClaim {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        self.registry.active.lock().remove(&self.call_id);
        debug!("Session released: {}", self.call_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_refused() {
        let registry = SessionRegistry::new();
        let claim = registry.claim("c-1").unwrap();
        assert_eq!(claim.call_id(), "c-1");

        let err = registry.claim("c-1").unwrap_err();
        assert_eq!(err, ClientError::SessionInUse("c-1".to_string()));

        // Different calls do not conflict
        let _other = registry.claim("c-2").unwrap();
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_drop_releases_claim() {
        let registry = SessionRegistry::new();
        {
            let _claim = registry.claim("c-1").unwrap();
            assert!(registry.is_active("c-1"));
        }
        assert!(!registry.is_active("c-1"));
        assert!(registry.claim("c-1").is_ok());
    }
}
