//! Obtaining the local identity for a session.

use std::sync::Arc;

use parley_core::Identity;
use parley_store::{IdentityStore, StoreError};
use tracing::{info, warn};

use crate::error::Result;

/// Resolves the identity a chat core runs under.
///
/// Resolution order: a caller-supplied identity, then the stored one, then
/// a freshly generated keypair. Whatever is chosen ends up persisted.
pub struct IdentityManager<I> {
    store: Arc<I>,
    slot: String,
}

impl<I: IdentityStore> IdentityManager<I> {
    pub fn new(store: Arc<I>, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
        }
    }

    /// Return the identity to use for this session.
    ///
    /// A stored record that fails to parse is logged and replaced.
    pub async fn obtain_identity(&self, existing: Option<Identity>) -> Result<Identity> {
        if let Some(identity) = existing {
            self.store.save_identity(&self.slot, &identity).await?;
            info!(participant = %identity.id(), "using supplied identity");
            return Ok(identity);
        }

        match self.store.load_identity(&self.slot).await {
            Ok(Some(identity)) => {
                info!(participant = %identity.id(), "identity loaded");
                return Ok(identity);
            }
            Ok(None) => {}
            Err(StoreError::InvalidData(reason)) => {
                warn!(slot = %self.slot, %reason, "stored identity is corrupt, generating a new one");
            }
            Err(e) => return Err(e.into()),
        }

        let identity = Identity::generate();
        self.store.save_identity(&self.slot, &identity).await?;
        info!(participant = %identity.id(), "identity created");
        Ok(identity)
    }
}
