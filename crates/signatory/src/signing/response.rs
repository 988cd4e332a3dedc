use std::collections::BTreeMap;

use super::association::FieldSource;
use crate::kvform::{self, KvFormError};
use crate::protocol::fields;

/// An outgoing provider message awaiting a signature.
///
/// Field names are kept unprefixed; [`Response::to_indirect`] adds the
/// `openid.` prefix when the message is sent through the user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    requested_handle: Option<String>,
    fields: BTreeMap<String, String>,
    signed: Vec<String>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// A response to a relying party that asked for a specific association.
    pub fn for_handle(handle: impl Into<String>) -> Self {
        Self {
            requested_handle: Some(handle.into()),
            ..Self::default()
        }
    }

    /// The association handle the relying party asked the provider to use.
    pub fn requested_handle(&self) -> Option<&str> {
        self.requested_handle.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Set a field and append it to the signed list.
    pub fn set_signed_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.fields.insert(name.clone(), value.into());
        self.mark_signed(name);
    }

    /// Append `name` to the signed list unless it is already there.
    pub fn mark_signed(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.signed.contains(&name) {
            self.signed.push(name);
        }
    }

    /// Names of the signed fields, in signing order.
    pub fn signed(&self) -> &[String] {
        &self.signed
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Fields with the `openid.` prefix, as carried in a redirect.
    pub fn to_indirect(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(name, value)| (fields::prefixed(name), value.clone()))
            .collect()
    }

    /// Fields as a key-value form body, for direct responses.
    pub fn to_kvform(&self) -> Result<String, KvFormError> {
        kvform::encode(&self.fields)
    }
}

impl FieldSource for Response {
    fn field(&self, key: &str) -> Option<&str> {
        Response::field(self, key)
    }
}
