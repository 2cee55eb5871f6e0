use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Opaque, server-issued user token. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(raw: impl Into<String>) -> Result<Self, ClientError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ClientError::MalformedMessage(
                "user identity is empty".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for UserIdentity {
    type Error = ClientError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<UserIdentity> for String {
    fn from(identity: UserIdentity) -> Self {
        identity.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserIdentity {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
