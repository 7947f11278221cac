//! Minimal bencode codec.
//!
//! The inter-node transfer dict uses exactly three bencode shapes:
//! integers (`i42e`), byte strings (`4:spam`), and dicts
//! (`d2:ek32:...e`) with bytewise-sorted keys. Nothing else appears on
//! this wire, so nothing else is implemented.
//!
//! Decoding enforces canonical form (sorted, unique dict keys and full
//! input consumption), which makes `decode(encode(v)) == v` hold
//! byte-for-byte in both directions.

use std::collections::BTreeMap;

use crate::{OnionError, Result};

/// Nesting ceiling; the transfer dict is flat, so this is generous.
const MAX_DEPTH: usize = 16;

/// A bencoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `i<digits>e`
    Int(i64),
    /// `<len>:<bytes>`
    Bytes(Vec<u8>),
    /// `d<key><value>...e`, keys sorted bytewise.
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Serialize a value to its canonical bencoding.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Int(n) => {
            out.push(b'i');
            out.extend_from_slice(n.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(bytes) => {
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(bytes);
        }
        Value::Dict(entries) => {
            out.push(b'd');
            // BTreeMap iterates in key order, which is bencode's
            // canonical dict order.
            for (key, val) in entries {
                encode_into(&Value::Bytes(key.clone()), out);
                encode_into(val, out);
            }
            out.push(b'e');
        }
    }
}

/// Parse a single bencoded value, requiring that it spans all of `data`.
pub fn decode(data: &[u8]) -> Result<Value> {
    let mut parser = Parser { data, pos: 0 };
    let value = parser.value(0)?;
    if parser.pos != data.len() {
        return Err(malformed(format!(
            "{} trailing bytes after value",
            data.len() - parser.pos
        )));
    }
    Ok(value)
}

fn malformed(msg: String) -> OnionError {
    OnionError::MalformedBencode(msg)
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| malformed("unexpected end of input".into()))
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(malformed("nesting too deep".into()));
        }
        match self.peek()? {
            b'i' => self.int(),
            b'd' => self.dict(depth),
            b'0'..=b'9' => Ok(Value::Bytes(self.byte_string()?)),
            other => Err(malformed(format!("unexpected byte {other:#04x}"))),
        }
    }

    fn int(&mut self) -> Result<Value> {
        self.pos += 1; // 'i'
        let start = self.pos;
        while self.peek()? != b'e' {
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.data[start..self.pos])
            .map_err(|_| malformed("non-ASCII integer".into()))?;
        self.pos += 1; // 'e'
        if digits.is_empty() || digits == "-" {
            return Err(malformed("empty integer".into()));
        }
        // Canonical form: no leading zeros, no negative zero.
        let unsigned = digits.strip_prefix('-').unwrap_or(digits);
        if unsigned.len() > 1 && unsigned.starts_with('0') || digits == "-0" {
            return Err(malformed(format!("non-canonical integer {digits:?}")));
        }
        let n = digits
            .parse::<i64>()
            .map_err(|_| malformed(format!("integer {digits:?} out of range")))?;
        Ok(Value::Int(n))
    }

    fn byte_string(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        while self.peek()? != b':' {
            if !self.data[self.pos].is_ascii_digit() {
                return Err(malformed("invalid string length".into()));
            }
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.data[start..self.pos]).expect("ASCII digits");
        if digits.is_empty() || (digits.len() > 1 && digits.starts_with('0')) {
            return Err(malformed(format!("non-canonical string length {digits:?}")));
        }
        let len = digits
            .parse::<usize>()
            .map_err(|_| malformed(format!("string length {digits:?} out of range")))?;
        self.pos += 1; // ':'
        if self.data.len() - self.pos < len {
            return Err(malformed(format!(
                "string length {len} overruns the input"
            )));
        }
        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(bytes)
    }

    fn dict(&mut self, depth: usize) -> Result<Value> {
        self.pos += 1; // 'd'
        let mut entries = BTreeMap::new();
        let mut last_key: Option<Vec<u8>> = None;
        while self.peek()? != b'e' {
            let key = self.byte_string()?;
            if let Some(prev) = &last_key {
                if *prev >= key {
                    return Err(malformed("dict keys not sorted".into()));
                }
            }
            let val = self.value(depth + 1)?;
            last_key = Some(key.clone());
            entries.insert(key, val);
        }
        self.pos += 1; // 'e'
        Ok(Value::Dict(entries))
    }
}
