//! Value types shared by the encryption and decryption flows.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Opaque 32-byte reference to a ciphertext held by the coprocessor.
pub type Handle = B256;

/// A plaintext value queued for encryption, tagged with its encrypted type.
///
/// Serializes as `{"type": "euint8", "value": 5}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TypedValue {
    #[serde(rename = "ebool")]
    Bool(bool),
    #[serde(rename = "euint8")]
    U8(u8),
    #[serde(rename = "euint16")]
    U16(u16),
    #[serde(rename = "euint32")]
    U32(u32),
    #[serde(rename = "euint64")]
    U64(u64),
}

impl TypedValue {
    /// Bit width of the encrypted type.
    pub fn bits(&self) -> u32 {
        match self {
            TypedValue::Bool(_) => 1,
            TypedValue::U8(_) => 8,
            TypedValue::U16(_) => 16,
            TypedValue::U32(_) => 32,
            TypedValue::U64(_) => 64,
        }
    }

    /// fhEVM type discriminant, embedded in byte 30 of every handle.
    pub fn type_code(&self) -> u8 {
        match self {
            TypedValue::Bool(_) => 0,
            TypedValue::U8(_) => 2,
            TypedValue::U16(_) => 3,
            TypedValue::U32(_) => 4,
            TypedValue::U64(_) => 5,
        }
    }

    pub fn as_u128(&self) -> u128 {
        match *self {
            TypedValue::Bool(b) => b as u128,
            TypedValue::U8(v) => v as u128,
            TypedValue::U16(v) => v as u128,
            TypedValue::U32(v) => v as u128,
            TypedValue::U64(v) => v as u128,
        }
    }

    /// Wrapping addition at the value's own width. `None` for booleans.
    pub fn wrapping_add(&self, rhs: u64) -> Option<TypedValue> {
        match *self {
            TypedValue::Bool(_) => None,
            TypedValue::U8(v) => Some(TypedValue::U8(v.wrapping_add(rhs as u8))),
            TypedValue::U16(v) => Some(TypedValue::U16(v.wrapping_add(rhs as u16))),
            TypedValue::U32(v) => Some(TypedValue::U32(v.wrapping_add(rhs as u32))),
            TypedValue::U64(v) => Some(TypedValue::U64(v.wrapping_add(rhs))),
        }
    }
}

/// A decrypted plaintext as returned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClearValue {
    Bool(bool),
    Uint(U256),
    Text(String),
}

impl ClearValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ClearValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ClearValue::Uint(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl From<TypedValue> for ClearValue {
    fn from(value: TypedValue) -> Self {
        match value {
            TypedValue::Bool(b) => ClearValue::Bool(b),
            other => ClearValue::Uint(U256::from(other.as_u128())),
        }
    }
}

impl fmt::Display for ClearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearValue::Bool(b) => write!(f, "{b}"),
            ClearValue::Uint(v) => write!(f, "{v}"),
            ClearValue::Text(s) => f.write_str(s),
        }
    }
}

/// Result of sealing an encrypted input batch.
///
/// `handles[i]` corresponds to the i-th appended value. Both the handles and
/// the proof are only valid for the (contract, submitter) pair the batch was
/// built against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedInput {
    pub handles: Vec<Handle>,
    pub input_proof: Bytes,
}

/// One entry of a user decryption request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: Handle,
    pub contract_address: Address,
}

impl HandleContractPair {
    pub fn new(handle: Handle, contract_address: Address) -> Self {
        Self {
            handle,
            contract_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_value_wire_shape() {
        let json = serde_json::to_value(TypedValue::U8(5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "euint8", "value": 5}));
        let json = serde_json::to_value(TypedValue::Bool(true)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ebool", "value": true}));
    }

    #[test]
    fn wrapping_add_respects_width() {
        assert_eq!(TypedValue::U8(255).wrapping_add(1), Some(TypedValue::U8(0)));
        assert_eq!(TypedValue::U32(41).wrapping_add(1), Some(TypedValue::U32(42)));
        assert_eq!(TypedValue::Bool(false).wrapping_add(1), None);
    }

    #[test]
    fn clear_value_untagged_parsing() {
        let v: ClearValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ClearValue::Bool(true));

        let v: ClearValue = serde_json::from_str("\"0x2a\"").unwrap();
        assert_eq!(v.as_u64(), Some(42));

        let v: ClearValue = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(v, ClearValue::Text("hello".into()));
    }

    #[test]
    fn clear_value_display() {
        assert_eq!(ClearValue::from(TypedValue::U32(7)).to_string(), "7");
        assert_eq!(ClearValue::Bool(false).to_string(), "false");
    }

    #[test]
    fn sealed_input_uses_relayer_keys() {
        let sealed = SealedInput {
            handles: vec![B256::with_last_byte(1)],
            input_proof: Bytes::from(vec![0x02]),
        };
        let json = serde_json::to_value(&sealed).unwrap();
        assert_eq!(json["inputProof"], "0x02");
        assert_eq!(json["handles"].as_array().unwrap().len(), 1);
    }
}
