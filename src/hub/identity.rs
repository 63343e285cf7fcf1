//! Client identity generation

use std::fmt;

use chrono::Utc;
use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

/// Length of the random suffix of a generated id
const SUFFIX_LEN: usize = 8;

/// Opaque identity assigned to a connection when it is accepted
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Mint a fresh identity: `client_<YYYYmmddHHMMSS>_<8 alphanumerics>`.
    ///
    /// The suffix is drawn from the thread-local RNG, so ids minted in the
    /// same second by concurrent accepts do not collide in practice.
    pub fn generate() -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();

        Self(format!(
            "client_{}_{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
