//! Raw responses, the shared response envelope and the decoded run-many result.

use crate::error::ProviderError;
use crate::{Error, Result};
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;
use std::fmt;

/// Raw JSON result of one remote call, decoded lazily by the caller.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    raw: Box<RawValue>,
}

impl ApiResponse {
    pub fn new(raw: Box<RawValue>) -> Self {
        Self { raw }
    }

    /// Build a response from JSON text. Mostly useful for tests and fakes.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw = RawValue::from_string(text.to_string())?;
        Ok(Self { raw })
    }

    /// The undecoded JSON text.
    pub fn raw(&self) -> &str {
        self.raw.get()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(self.raw.get())?)
    }

    /// `false` is what the run-many endpoint returns in place of a failed sub-call.
    pub fn is_failure_sentinel(&self) -> bool {
        self.raw.get().trim() == "false"
    }
}

impl PartialEq for ApiResponse {
    fn eq(&self, other: &Self) -> bool {
        self.raw.get() == other.raw.get()
    }
}

/// Whole-call error object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    #[serde(alias = "code")]
    pub error_code: i64,
    #[serde(default, alias = "message")]
    pub error_msg: String,
}

impl From<RemoteError> for ProviderError {
    fn from(e: RemoteError) -> Self {
        ProviderError::new(e.error_code, e.error_msg)
    }
}

/// One failed sub-call as reported by the run-many endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecuteError {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(alias = "code")]
    pub error_code: i64,
    #[serde(default, alias = "message")]
    pub error_msg: String,
}

/// Response envelope: `{error?, response?, execute_errors?}`.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub error: Option<RemoteError>,
    #[serde(default)]
    pub response: Option<Box<RawValue>>,
    #[serde(default, alias = "executeErrors")]
    pub execute_errors: Vec<ExecuteError>,
}

impl Envelope {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Single-call interpretation: the provider error, or the raw response.
    pub fn into_response(self) -> Result<ApiResponse> {
        if let Some(err) = self.error {
            return Err(Error::Provider(err.into()));
        }
        match self.response {
            Some(raw) => Ok(ApiResponse::new(raw)),
            None => Err(Error::decode("envelope carries neither response nor error")),
        }
    }
}

/// Decoded run-many result.
///
/// `responses` keeps the order in which the endpoint returned the ids; `errors` keeps the
/// order in which it reported the failures. Sub-error pairing depends on both.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub responses: Vec<(String, ApiResponse)>,
    pub errors: Vec<ExecuteError>,
}

impl AggregateResult {
    pub fn from_envelope(envelope: Envelope) -> Result<Self> {
        if let Some(err) = envelope.error {
            return Err(Error::Provider(err.into()));
        }
        let responses = match envelope.response {
            Some(raw) => {
                let entries: OrderedEntries = serde_json::from_str(raw.get()).map_err(|e| {
                    Error::decode(format!("run-many response is not an id map: {}", e))
                })?;
                entries
                    .0
                    .into_iter()
                    .map(|(id, raw)| (id, ApiResponse::new(raw)))
                    .collect()
            }
            None => Vec::new(),
        };
        Ok(Self {
            responses,
            errors: envelope.execute_errors,
        })
    }
}

/// JSON object decoded into `(key, raw value)` pairs in wire order.
struct OrderedEntries(Vec<(String, Box<RawValue>)>);

impl<'de> Deserialize<'de> for OrderedEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = OrderedEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping request ids to results")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, raw)) = map.next_entry::<String, Box<RawValue>>()? {
                    entries.push((id, raw));
                }
                Ok(OrderedEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}
