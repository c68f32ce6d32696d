//! Credential binding for the event-stream handshake.
//!
//! Token acquisition and refresh live outside this crate; the binder only
//! holds whatever token it was last given and stamps it onto the endpoint.

use tracing::debug;
use url::Url;

use creatorguard_protocol::constants::AUTH_QUERY_PARAM;

/// Holds the current session credential.
#[derive(Debug, Default, Clone)]
pub struct AuthBinder {
    token: Option<String>,
    /// Set when the server rejected `token`; cleared by the next rotation.
    rejected: bool,
}

impl AuthBinder {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            rejected: false,
        }
    }

    /// Returns the token that the next handshake will use.
    pub fn current(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Replaces the credential. An empty token clears it.
    pub fn rotate(&mut self, token: impl Into<String>) {
        let token = token.into();
        debug!(has_token = !token.is_empty(), "auth token rotated");
        self.token = Some(token).filter(|t| !t.is_empty());
        self.rejected = false;
    }

    /// Marks the current credential as refused by the server.
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    /// Whether the current credential was refused and must be rotated
    /// before the next handshake.
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Returns `endpoint` with the credential as a query parameter, replacing
    /// any credential already present in the URL.
    pub fn bind(&self, endpoint: &str) -> Result<String, url::ParseError> {
        let mut url = Url::parse(endpoint)?;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != AUTH_QUERY_PARAM)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.set_query(None);
        if !kept.is_empty() || self.token.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            if let Some(token) = &self.token {
                pairs.append_pair(AUTH_QUERY_PARAM, token);
            }
        }
        Ok(url.into())
    }
}
