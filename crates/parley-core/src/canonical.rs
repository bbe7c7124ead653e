//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Two encodings exist. The *draft* encoding (keys 0-7) is what gets signed
//! and MAC'd. The *message* encoding adds the seal (keys 8-9) and is what
//! gets encrypted onto the wire and persisted.

use ciborium::value::{Integer, Value};

use crate::crypto::{Ed25519Signature, MacTag};
use crate::error::{CoreError, Result};
use crate::message::{
    Message, MessageBody, MessageDraft, MessageHeader, MessageKind, Seal, MESSAGE_VERSION,
};
use crate::types::{ConversationId, MessageId, ParticipantId};

/// Field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const ID: u64 = 1;
    pub const CONVERSATION_ID: u64 = 2;
    pub const SENDER: u64 = 3;
    pub const TIMESTAMP: u64 = 4;
    pub const KIND: u64 = 5;
    pub const CONTENT: u64 = 6;
    pub const TOMBSTONE_FOR: u64 = 7;
    pub const SIGNATURE: u64 = 8;
    pub const MAC: u64 = 9;
}

/// Encode a draft to the canonical bytes covered by signature and MAC.
pub fn draft_bytes(draft: &MessageDraft) -> Vec<u8> {
    let entries = draft_entries(&draft.header, &draft.body);
    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Encode a sealed message to canonical bytes.
pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut entries = draft_entries(&message.header, &message.body);
    entries.push((
        int(keys::SIGNATURE),
        Value::Bytes(message.seal.signature.0.to_vec()),
    ));
    entries.push((int(keys::MAC), Value::Bytes(message.seal.mac.0.to_vec())));
    encode_cbor_value_canonical(&Value::Map(entries))
}

fn int(key: u64) -> Value {
    Value::Integer(key.into())
}

fn draft_entries(header: &MessageHeader, body: &MessageBody) -> Vec<(Value, Value)> {
    let tombstone_for = match body.tombstone_for() {
        Some(target) => Value::Text(target.as_str().to_string()),
        None => Value::Null,
    };

    vec![
        (int(keys::VERSION), Value::Integer(MESSAGE_VERSION.into())),
        (int(keys::ID), Value::Text(header.id.as_str().to_string())),
        (
            int(keys::CONVERSATION_ID),
            Value::Text(header.conversation_id.as_str().to_string()),
        ),
        (int(keys::SENDER), Value::Text(header.sender.as_str().to_string())),
        (int(keys::TIMESTAMP), Value::Integer(header.timestamp.into())),
        (int(keys::KIND), Value::Integer(body.kind().to_u8().into())),
        (int(keys::CONTENT), Value::Text(body.content().to_string())),
        (int(keys::TOMBSTONE_FOR), tombstone_for),
    ]
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
///
/// Only the value shapes produced by [`draft_entries`] are handled.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        other => unreachable!("message encoding never produces {:?}", other),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode a sealed message from canonical bytes.
///
/// Rejects anything that does not re-encode to exactly the same bytes, so
/// a decoded message always has a single byte representation.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let message = cbor_value_to_message(&value)?;

    if encode_message(&message) != bytes {
        return Err(CoreError::MalformedMessage("non-canonical encoding".into()));
    }

    Ok(message)
}

fn cbor_value_to_message(value: &Value) -> Result<Message> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedMessage("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let text = |key: u64, name: &str| -> Result<String> {
        match get(key) {
            Some(Value::Text(s)) => Ok(s.clone()),
            _ => Err(CoreError::MalformedMessage(format!("missing {}", name))),
        }
    };

    let integer = |key: u64, name: &str| -> Result<i128> {
        match get(key) {
            Some(Value::Integer(i)) => Ok(i128::from(*i)),
            _ => Err(CoreError::MalformedMessage(format!("missing {}", name))),
        }
    };

    let version = integer(keys::VERSION, "version")?;
    if version != MESSAGE_VERSION as i128 {
        return Err(CoreError::UnsupportedVersion(version.clamp(0, 255) as u8));
    }

    let id = MessageId::new(text(keys::ID, "id")?);
    let conversation_id = ConversationId::new(text(keys::CONVERSATION_ID, "conversation_id")?);
    let sender = ParticipantId::parse(&text(keys::SENDER, "sender")?)?;

    let timestamp = i64::try_from(integer(keys::TIMESTAMP, "timestamp")?)
        .map_err(|_| CoreError::MalformedMessage("timestamp out of range".into()))?;

    let kind = u8::try_from(integer(keys::KIND, "kind")?)
        .ok()
        .and_then(MessageKind::from_u8)
        .ok_or_else(|| CoreError::MalformedMessage("invalid kind".into()))?;

    let content = text(keys::CONTENT, "content")?;

    let tombstone_for = match get(keys::TOMBSTONE_FOR) {
        Some(Value::Text(s)) => Some(MessageId::new(s.clone())),
        Some(Value::Null) => None,
        _ => return Err(CoreError::MalformedMessage("invalid tombstone_for".into())),
    };

    let body = match (kind, tombstone_for) {
        (MessageKind::Text, None) => MessageBody::Text { content },
        (MessageKind::Tombstone, Some(target)) if content.is_empty() => {
            MessageBody::Tombstone { target }
        }
        (MessageKind::Text, Some(_)) => {
            return Err(CoreError::MalformedMessage("text message with target".into()))
        }
        (MessageKind::Tombstone, _) => {
            return Err(CoreError::MalformedMessage(
                "tombstone needs a target and no content".into(),
            ))
        }
    };

    let signature = match get(keys::SIGNATURE) {
        Some(Value::Bytes(b)) => {
            let arr: [u8; 64] = b
                .as_slice()
                .try_into()
                .map_err(|_| CoreError::MalformedMessage("invalid signature length".into()))?;
            Ed25519Signature(arr)
        }
        _ => return Err(CoreError::MalformedMessage("missing signature".into())),
    };

    let mac = match get(keys::MAC) {
        Some(Value::Bytes(b)) => {
            let arr: [u8; 32] = b
                .as_slice()
                .try_into()
                .map_err(|_| CoreError::MalformedMessage("invalid mac length".into()))?;
            MacTag(arr)
        }
        _ => return Err(CoreError::MalformedMessage("missing mac".into())),
    };

    Ok(Message {
        header: MessageHeader {
            id,
            conversation_id,
            sender,
            timestamp,
        },
        body,
        seal: Seal { signature, mac },
    })
}
