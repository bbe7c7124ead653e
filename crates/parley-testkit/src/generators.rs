//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use parley_core::{ConversationId, Identity, Message, MessageDraft, ParticipantId};
use parley_crypto::{codec, ConversationKey};

/// Generate an identity from a random seed.
pub fn identity() -> impl Strategy<Value = Identity> {
    any::<[u8; 32]>().prop_map(|seed| Identity::from_seed(&seed))
}

/// Generate a participant id.
pub fn participant_id() -> impl Strategy<Value = ParticipantId> {
    identity().prop_map(|identity| identity.id().clone())
}

/// Generate between `min` and `max` distinct participant ids.
pub fn participant_set(min: usize, max: usize) -> impl Strategy<Value = BTreeSet<ParticipantId>> {
    prop::collection::btree_set(participant_id(), min..=max)
}

/// Generate a conversation id in either the Direct or the Group shape.
pub fn conversation_id() -> impl Strategy<Value = ConversationId> {
    prop_oneof![
        (participant_id(), participant_id())
            .prop_map(|(a, b)| ConversationId::new(format!("{}_{}", a, b))),
        any::<[u8; 16]>().prop_map(|bytes| {
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            ConversationId::new(format!("group_{}", hex))
        }),
    ]
}

/// Generate a conversation key.
pub fn conversation_key() -> impl Strategy<Value = ConversationKey> {
    any::<[u8; 32]>().prop_map(ConversationKey::from_bytes)
}

/// Generate message text, unicode included.
pub fn content(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 0..=max_len).prop_map(|chars| chars.into_iter().collect())
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Parameters for generating a message.
#[derive(Debug, Clone)]
pub struct MessageParams {
    pub sender: Identity,
    pub conversation_id: ConversationId,
    pub content: String,
    pub timestamp: i64,
}

impl Arbitrary for MessageParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (identity(), conversation_id(), content(256), timestamp())
            .prop_map(|(sender, conversation_id, content, timestamp)| MessageParams {
                sender,
                conversation_id,
                content,
                timestamp,
            })
            .boxed()
    }
}

/// Build the unsealed draft for `params`.
pub fn draft_from_params(params: &MessageParams) -> MessageDraft {
    codec::build_text_message(
        &params.conversation_id,
        params.sender.id(),
        params.content.clone(),
        params.timestamp,
    )
}

/// Build and seal a message from parameters.
pub fn message_from_params(params: &MessageParams, key: &ConversationKey) -> Message {
    codec::seal(draft_from_params(params), &params.sender, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{decode_message, encode_message};

    proptest! {
        #[test]
        fn prop_sealed_messages_verify(params: MessageParams, key in conversation_key()) {
            let message = message_from_params(&params, &key);
            prop_assert!(codec::verify_signature(&message));
            prop_assert!(codec::verify_mac(&message, &key));
        }

        #[test]
        fn prop_wire_open_is_exact(params: MessageParams, key in conversation_key()) {
            let message = message_from_params(&params, &key);
            let wire = codec::encode_for_wire(&message, &key).unwrap();
            let opened = codec::open(&wire, &params.conversation_id, &key).unwrap();
            prop_assert_eq!(opened, message);
        }

        #[test]
        fn prop_canonical_encoding_is_stable(params: MessageParams, key in conversation_key()) {
            let message = message_from_params(&params, &key);
            let bytes = encode_message(&message);
            let decoded = decode_message(&bytes).unwrap();
            prop_assert_eq!(encode_message(&decoded), bytes);
        }
    }
}
