//! Minimal Solidity ABI codec for the calls the client makes.
//!
//! Only static argument types are encoded.  Decoding covers static words,
//! static tuples/records, and top-level dynamic arrays of static elements,
//! which is everything the protocol contracts return.

use crate::settlement::{Address, CallArg, ReadValue, ReturnShape};
use crate::u256::U256;
use sha3::{Digest, Keccak256};
use thiserror::Error;

const WORD: usize = 32;
/// Selector of the standard `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Errors raised while decoding call data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    /// Data ended before the expected word.
    #[error("abi data truncated at byte {0}")]
    Truncated(usize),
    /// An offset or length word does not fit the data.
    #[error("abi offset out of range: {0}")]
    BadOffset(String),
    /// Shape the decoder does not handle.
    #[error("unsupported abi shape: {0}")]
    UnsupportedShape(String),
    /// Hex payload could not be decoded.
    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
}

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// `0x`-prefixed lowercase hex.
pub fn encode_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decodes hex with or without a `0x` prefix.
pub fn decode_hex_prefixed(text: &str) -> Result<Vec<u8>, AbiError> {
    let raw = text.trim();
    let raw = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    hex::decode(raw).map_err(|err| AbiError::InvalidHex(err.to_string()))
}

fn encode_arg(arg: &CallArg) -> [u8; 32] {
    match arg {
        CallArg::Uint(value) => value.to_word(),
        CallArg::Address(addr) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(addr.as_bytes());
            word
        }
        CallArg::Bool(flag) => {
            let mut word = [0u8; 32];
            word[31] = u8::from(*flag);
            word
        }
    }
}

/// Selector followed by the head-encoded arguments.
pub fn encode_call(signature: &str, args: &[CallArg]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + args.len() * WORD);
    out.extend_from_slice(&selector(signature));
    for arg in args {
        out.extend_from_slice(&encode_arg(arg));
    }
    out
}

fn word_at(data: &[u8], offset: usize) -> Result<[u8; 32], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Truncated(offset))?;
    let slice = data.get(offset..end).ok_or(AbiError::Truncated(offset))?;
    let mut word = [0u8; 32];
    word.copy_from_slice(slice);
    Ok(word)
}

fn usize_at(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    let value = U256::from_word(&word_at(data, offset)?);
    value
        .to_u64()
        .and_then(|v| usize::try_from(v).ok())
        .filter(|v| *v <= data.len())
        .ok_or_else(|| AbiError::BadOffset(value.to_string()))
}

/// Decodes return data against the expected shape.
///
/// Tuples and records at the top level are treated as multiple outputs; any
/// other shape is a single output.
pub fn decode(data: &[u8], shape: &ReturnShape) -> Result<ReadValue, AbiError> {
    match shape {
        ReturnShape::Tuple(fields) => {
            let values = decode_outputs(data, fields.iter())?;
            Ok(ReadValue::Tuple(values))
        }
        ReturnShape::Record(fields) => {
            let values = decode_outputs(data, fields.iter().map(|(_, s)| s))?;
            let named = fields
                .iter()
                .zip(values)
                .map(|((name, _), value)| (name.to_string(), value))
                .collect();
            Ok(ReadValue::Record(named))
        }
        single => decode_outputs(data, std::iter::once(single))?
            .pop()
            .ok_or_else(|| AbiError::UnsupportedShape("empty output".into())),
    }
}

fn decode_outputs<'a>(
    data: &[u8],
    shapes: impl Iterator<Item = &'a ReturnShape>,
) -> Result<Vec<ReadValue>, AbiError> {
    let mut head = 0usize;
    let mut values = Vec::new();
    for shape in shapes {
        match shape {
            ReturnShape::List(element) => {
                let offset = usize_at(data, head)?;
                values.push(decode_list(data, offset, element)?);
                head += WORD;
            }
            _ => {
                values.push(decode_static(data, head, shape)?);
                head += shape.static_words().unwrap_or(1) * WORD;
            }
        }
    }
    Ok(values)
}

fn decode_list(data: &[u8], offset: usize, element: &ReturnShape) -> Result<ReadValue, AbiError> {
    let words = element
        .static_words()
        .ok_or_else(|| AbiError::UnsupportedShape("nested dynamic array".into()))?;
    let len = usize_at(data, offset)?;
    let start = offset + WORD;
    let needed = len
        .checked_mul(words * WORD)
        .and_then(|n| n.checked_add(start))
        .ok_or_else(|| AbiError::BadOffset(len.to_string()))?;
    if needed > data.len() {
        return Err(AbiError::Truncated(data.len()));
    }
    let items = (0..len)
        .map(|i| decode_static(data, start + i * words * WORD, element))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ReadValue::List(items))
}

fn decode_static(data: &[u8], offset: usize, shape: &ReturnShape) -> Result<ReadValue, AbiError> {
    match shape {
        ReturnShape::Uint => Ok(ReadValue::Uint(U256::from_word(&word_at(data, offset)?))),
        ReturnShape::Bool => Ok(ReadValue::Bool(
            !U256::from_word(&word_at(data, offset)?).is_zero(),
        )),
        ReturnShape::Address => {
            let word = word_at(data, offset)?;
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&word[12..]);
            Ok(ReadValue::Address(Address::from_bytes(bytes)))
        }
        ReturnShape::Tuple(fields) => {
            let mut cursor = offset;
            let mut values = Vec::with_capacity(fields.len());
            for field in fields {
                values.push(decode_static(data, cursor, field)?);
                cursor += field.static_words().unwrap_or(1) * WORD;
            }
            Ok(ReadValue::Tuple(values))
        }
        ReturnShape::Record(fields) => {
            let mut cursor = offset;
            let mut values = Vec::with_capacity(fields.len());
            for (name, field) in fields {
                values.push((name.to_string(), decode_static(data, cursor, field)?));
                cursor += field.static_words().unwrap_or(1) * WORD;
            }
            Ok(ReadValue::Record(values))
        }
        ReturnShape::List(_) => Err(AbiError::UnsupportedShape(
            "dynamic array inside a static value".into(),
        )),
    }
}

/// Reason string of an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    let offset = usize_at(body, 0).ok()?;
    let len = usize_at(body, offset).ok()?;
    let start = offset.checked_add(WORD)?;
    let bytes = body.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}
