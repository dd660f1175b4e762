//! Address newtypes.
//!
//! All three are thin wrappers over `String`. They exist so that a borrower
//! can never be passed where a pool vault is expected, and so that record
//! keys are derived from typed inputs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A participant's address.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The value account owned by this identity.
    pub fn account(&self) -> AccountId {
        AccountId(self.0.clone())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of the asset a pool lends, e.g. `"USDC"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A value-holding account in the external ledger.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&Identity> for AccountId {
    fn from(id: &Identity) -> Self {
        id.account()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_account_shares_address() {
        let alice = Identity::new("alice");
        assert_eq!(alice.account().as_str(), "alice");
        assert_eq!(AccountId::from(&alice), alice.account());
    }

    #[test]
    fn newtypes_serialize_transparently() {
        let json = serde_json::to_string(&Identity::new("bob")).unwrap();
        assert_eq!(json, "\"bob\"");
        let asset: AssetId = serde_json::from_str("\"USDC\"").unwrap();
        assert_eq!(asset.as_str(), "USDC");
    }

    #[test]
    fn debug_is_tagged() {
        assert_eq!(format!("{:?}", Identity::new("carol")), "Identity(carol)");
    }
}
