//! Retail API request signing
//!
//! Canonical form: drop blank values, sort keys by raw string, concatenate
//! `key + value`, wrap with the shared secret on both sides, then MD5 to lowercase hex.

use md5::{Digest, Md5};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar parameter value. `Null` and whitespace-only text never reach the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Null,
    Text(String),
    Int(i64),
}

impl ParamValue {
    /// String form used for signing, or `None` when the entry is filtered out.
    pub fn signing_str(&self) -> Option<String> {
        match self {
            ParamValue::Null => None,
            ParamValue::Text(s) if s.trim().is_empty() => None,
            ParamValue::Text(s) => Some(s.clone()),
            ParamValue::Int(n) => Some(n.to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => Ok(()),
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Int(n)
    }
}

impl From<u32> for ParamValue {
    fn from(n: u32) -> Self {
        ParamValue::Int(n as i64)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Parameter set fed to the signer. Keys are unique; later inserts overwrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedParameters {
    params: BTreeMap<String, ParamValue>,
}

impl SignedParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Entries that survive the blank-value filter, sorted by key.
    pub fn canonical_entries(&self) -> Vec<(&str, String)> {
        // BTreeMap iterates in byte order of the key, which is the canonical order.
        self.params
            .iter()
            .filter_map(|(k, v)| v.signing_str().map(|s| (k.as_str(), s)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for SignedParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Every intermediate of one signing pass, for byte-level comparison with other signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningTrace {
    pub sorted_keys: Vec<String>,
    pub concat_string: String,
    #[serde(rename = "stringToMD5")]
    pub string_to_hash: String,
    pub sign: String,
}

/// Sign a parameter set with the shared secret.
pub fn sign(params: &SignedParameters, secret: &str) -> String {
    trace(params, secret).sign
}

/// Sign and keep the intermediates.
pub fn trace(params: &SignedParameters, secret: &str) -> SigningTrace {
    let entries = params.canonical_entries();

    let mut concat_string = String::new();
    for (k, v) in &entries {
        concat_string.push_str(k);
        concat_string.push_str(v);
    }

    let string_to_hash = format!("{secret}{concat_string}{secret}");
    let sign = md5_hex(&string_to_hash);

    SigningTrace {
        sorted_keys: entries.iter().map(|(k, _)| k.to_string()).collect(),
        concat_string,
        string_to_hash,
        sign,
    }
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
