//! Participant identity: a signing keypair and the id derived from it.

use std::fmt;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::types::ParticipantId;

/// A local participant identity.
///
/// The id is derived from the public key once at construction and never
/// changes. Cloning shares nothing mutable.
#[derive(Clone)]
pub struct Identity {
    id: ParticipantId,
    keypair: Keypair,
}

impl Identity {
    /// Generate a fresh identity from a random keypair.
    pub fn generate() -> Self {
        Self::from_keypair(Keypair::generate())
    }

    /// Rebuild an identity from its 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_keypair(Keypair::from_seed(seed))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        let id = ParticipantId::from_public_key(&keypair.public_key());
        Self { id, keypair }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// The secret seed, for handing to an identity store.
    pub fn secret_seed(&self) -> [u8; 32] {
        self.keypair.seed()
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.keypair.sign(message)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:?})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_seed_is_stable() {
        let a = Identity::from_seed(&[1; 32]);
        let b = Identity::from_seed(&[1; 32]);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.secret_seed(), [1; 32]);
    }

    #[test]
    fn test_identity_id_matches_public_key() {
        let identity = Identity::generate();
        assert_eq!(identity.id().public_key().unwrap(), identity.public_key());
    }

    #[test]
    fn test_distinct_identities() {
        assert_ne!(Identity::generate().id(), Identity::generate().id());
    }
}
