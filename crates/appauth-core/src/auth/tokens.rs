use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Type of access token issued by the token endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Bearer,
    #[serde(rename = "dpop")]
    DPoP,
}

/// Tokens returned by a successful code exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_type: TokenType,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default = "default_received_at")]
    pub received_at: DateTime<Utc>,
}

fn default_received_at() -> DateTime<Utc> {
    Utc::now()
}

impl TokenSet {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            token_type: TokenType::Bearer,
            expires_at: None,
            scope: vec![],
            received_at: Utc::now(),
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Fold a newer token response into this set.
    ///
    /// Refresh and ID tokens are optional in refresh responses; when the newer
    /// response omits one, the previously issued value stays valid.
    pub fn merge(self, newer: TokenSet) -> TokenSet {
        TokenSet {
            refresh_token: newer.refresh_token.or(self.refresh_token),
            id_token: newer.id_token.or(self.id_token),
            scope: if newer.scope.is_empty() {
                self.scope
            } else {
                newer.scope
            },
            ..newer
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(ts) => Utc::now() >= ts,
            None => false,
        }
    }

    pub fn will_expire_within(&self, window: Duration) -> bool {
        match self.expires_at {
            Some(ts) => Utc::now() + window >= ts,
            None => false,
        }
    }
}
