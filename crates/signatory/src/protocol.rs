use std::collections::HashMap;

use crate::signing::Algorithm;

/// Wire vocabulary shared with the message layer.
pub mod fields {
    /// Prefix carried by every argument in indirect (query/form) messages.
    pub const PREFIX: &str = "openid.";

    pub const NS: &str = "ns";
    pub const MODE: &str = "mode";
    pub const ASSOC_HANDLE: &str = "assoc_handle";
    pub const ASSOC_TYPE: &str = "assoc_type";
    pub const SESSION_TYPE: &str = "session_type";
    pub const EXPIRES_IN: &str = "expires_in";
    pub const MAC_KEY: &str = "mac_key";
    pub const INVALIDATE_HANDLE: &str = "invalidate_handle";
    pub const SIGNED: &str = "signed";
    pub const SIG: &str = "sig";
    pub const IS_VALID: &str = "is_valid";

    pub const MODE_ASSOCIATE: &str = "associate";
    pub const MODE_CHECK_AUTHENTICATION: &str = "check_authentication";
    pub const MODE_ID_RES: &str = "id_res";

    pub const SESSION_NO_ENCRYPTION: &str = "no-encryption";

    /// Prefixed form of `name`, as it appears in indirect messages.
    pub fn prefixed(name: &str) -> String {
        format!("{PREFIX}{name}")
    }
}

pub const OPENID_20_NAMESPACE: &str = "http://specs.openid.net/auth/2.0";

/// Protocol version spoken by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    V11,
    V20,
}

impl Protocol {
    /// Version declared by an `openid.ns` argument; absent means 1.1.
    pub fn from_namespace(ns: Option<&str>) -> Self {
        match ns {
            Some(OPENID_20_NAMESPACE) => Protocol::V20,
            _ => Protocol::V11,
        }
    }

    /// Association types this version allows relying parties to request.
    pub fn advertised_algorithms(&self) -> &'static [Algorithm] {
        match self {
            Protocol::V11 => &[Algorithm::HmacSha1],
            Protocol::V20 => &[Algorithm::HmacSha1, Algorithm::HmacSha256],
        }
    }

    /// Strongest advertised type; offered back when a request is refused.
    pub fn preferred_algorithm(&self) -> Algorithm {
        match self {
            Protocol::V11 => Algorithm::HmacSha1,
            Protocol::V20 => Algorithm::HmacSha256,
        }
    }

    pub fn advertises(&self, algorithm: Algorithm) -> bool {
        self.advertised_algorithms().contains(&algorithm)
    }

    pub fn namespace(&self) -> Option<&'static str> {
        match self {
            Protocol::V11 => None,
            Protocol::V20 => Some(OPENID_20_NAMESPACE),
        }
    }
}

/// The current provider request, as seen by smart association creation.
pub trait ProviderContext: Send + Sync {
    /// Raw `assoc_type` argument of the request, if present.
    fn assoc_type(&self) -> Option<&str>;

    /// Protocol version the request was made under.
    fn protocol(&self) -> Protocol;
}

/// A direct request whose arguments arrived as `openid.`-prefixed form fields.
#[derive(Debug, Clone)]
pub struct DirectRequest {
    protocol: Protocol,
    args: HashMap<String, String>,
}

impl DirectRequest {
    pub fn new(args: HashMap<String, String>) -> Self {
        let protocol =
            Protocol::from_namespace(args.get(&fields::prefixed(fields::NS)).map(String::as_str));
        Self { protocol, args }
    }

    /// Argument by unprefixed name.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(&fields::prefixed(name)).map(String::as_str)
    }

    pub fn mode(&self) -> Option<&str> {
        self.arg(fields::MODE)
    }

    /// All raw (prefixed) arguments.
    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }
}

impl ProviderContext for DirectRequest {
    fn assoc_type(&self) -> Option<&str> {
        self.arg(fields::ASSOC_TYPE)
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }
}
