//! The message codec: build, seal, encrypt and open chat messages.
//!
//! Outbound: `build_* -> seal -> encode_for_wire`.
//! Inbound: [`open`] runs `decrypt -> parse -> signature -> MAC ->
//! conversation check` and aborts at the first failing step.

use bytes::Bytes;
use parley_core::{
    canonical, ConversationId, Ed25519Signature, Identity, Keypair, MacTag, Message,
    MessageDraft, ParticipantId, Seal,
};

use crate::crypto::ConversationKey;
use crate::envelope::EncryptedPayload;
use crate::error::{CodecError, Result};

/// Build an unsealed text message under a fresh id.
pub fn build_text_message(
    conversation_id: &ConversationId,
    sender: &ParticipantId,
    content: impl Into<String>,
    timestamp: i64,
) -> MessageDraft {
    MessageDraft::text(conversation_id.clone(), sender.clone(), content, timestamp)
}

/// Build a tombstone revoking `target`.
///
/// Only the target's sender may revoke it, and tombstones are final.
pub fn build_tombstone(
    conversation_id: &ConversationId,
    sender: &ParticipantId,
    target: &Message,
    timestamp: i64,
) -> Result<MessageDraft> {
    if target.sender() != sender {
        return Err(CodecError::NotAuthorSender);
    }
    if target.is_tombstone() {
        return Err(CodecError::NotRevocable);
    }
    Ok(MessageDraft::tombstone(
        conversation_id.clone(),
        sender.clone(),
        target.id().clone(),
        timestamp,
    ))
}

/// Sign the canonical draft bytes.
pub fn sign(draft: &MessageDraft, keypair: &Keypair) -> Ed25519Signature {
    keypair.sign(&draft.signing_bytes())
}

/// Check the signature against the key embedded in `sender`.
///
/// The zero signature never verifies.
pub fn verify_signature(message: &Message) -> bool {
    let signature = &message.seal.signature;
    if signature.is_zero() {
        return false;
    }
    match message.sender().public_key() {
        Ok(public_key) => public_key
            .verify(&message.signing_bytes(), signature)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn compute_mac(draft: &MessageDraft, key: &ConversationKey) -> MacTag {
    key.mac(&draft.signing_bytes())
}

/// Constant-time MAC check.
pub fn verify_mac(message: &Message, key: &ConversationKey) -> bool {
    key.mac(&message.signing_bytes()) == message.seal.mac
}

/// Encrypt arbitrary bytes into an encoded envelope.
pub fn encrypt(plaintext: &[u8], key: &ConversationKey) -> Result<Vec<u8>> {
    EncryptedPayload::encrypt(plaintext, key)?.to_bytes()
}

/// Inverse of [`encrypt`].
pub fn decrypt(ciphertext: &[u8], key: &ConversationKey) -> Result<Vec<u8>> {
    EncryptedPayload::from_bytes(ciphertext)?.decrypt(key)
}

/// Sign and MAC a draft, producing a complete message.
///
/// The draft's sender should be `identity`; otherwise the result will not
/// pass [`verify_signature`] anywhere.
pub fn seal(draft: MessageDraft, identity: &Identity, key: &ConversationKey) -> Message {
    let signature = sign(&draft, identity.keypair());
    let mac = compute_mac(&draft, key);
    draft.seal(Seal { signature, mac })
}

/// Canonical-encode and encrypt a sealed message for the transport.
pub fn encode_for_wire(message: &Message, key: &ConversationKey) -> Result<Bytes> {
    let plaintext = canonical::encode_message(message);
    Ok(Bytes::from(encrypt(&plaintext, key)?))
}

/// Try to open `ciphertext` as a message of `trial_conversation`.
pub fn open(
    ciphertext: &[u8],
    trial_conversation: &ConversationId,
    key: &ConversationKey,
) -> Result<Message> {
    let plaintext = decrypt(ciphertext, key)?;
    let message = canonical::decode_message(&plaintext)?;

    if !verify_signature(&message) {
        return Err(CodecError::InvalidSignature);
    }
    if !verify_mac(&message, key) {
        return Err(CodecError::InvalidMac);
    }
    if message.conversation_id() != trial_conversation {
        return Err(CodecError::ConversationMismatch {
            expected: trial_conversation.clone(),
            found: message.conversation_id().clone(),
        });
    }

    Ok(message)
}
