use crate::config::{Config, Credentials};
use crate::error::Error;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;

/// Tokens with less remaining lifetime than this are refreshed before use.
pub const MIN_TOKEN_LIFETIME_SECS: i64 = 300;

#[derive(Deserialize)]
struct TokenInfo {
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenGrant {
    #[serde(default)]
    access_token: String,
}

/// Mints and introspects OAuth2 bearer tokens.
///
/// The manager keeps no token of its own: callers pass the current token in and
/// get the (possibly refreshed) token back.
#[derive(Clone)]
pub struct TokenManager {
    client: Client,
    token_url: String,
    token_info_url: String,
    credentials: Credentials,
}

impl TokenManager {
    pub fn new(client: Client, config: &Config, credentials: Credentials) -> Self {
        TokenManager {
            client,
            token_url: config.token_url.clone(),
            token_info_url: config.token_info_url.clone(),
            credentials,
        }
    }

    /// Asks the introspection endpoint how many seconds `token` has left.
    ///
    /// An empty token is rejected without touching the network.
    pub async fn remaining_lifetime(&self, token: &str) -> Result<i64, Error> {
        if token.is_empty() {
            return Err(Error::Auth {
                message: "no access token to introspect".to_string(),
            });
        }

        let info = self
            .client
            .get(&self.token_info_url)
            .query(&[("access_token", token)])
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(auth_error)?
            .json::<TokenInfo>()
            .await
            .map_err(auth_error)?;

        Ok(info.expires_in)
    }

    /// Exchanges the refresh token for a new access token.
    pub async fn issue_new_token(&self) -> Result<String, Error> {
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let grant = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(auth_error)?
            .json::<TokenGrant>()
            .await
            .map_err(auth_error)?;

        if grant.access_token.is_empty() {
            return Err(Error::Auth {
                message: "token endpoint returned no access_token".to_string(),
            });
        }

        info!("Issued a new access token");
        Ok(grant.access_token)
    }

    /// Returns `token` unchanged while it has at least [`MIN_TOKEN_LIFETIME_SECS`]
    /// left, otherwise a freshly issued token. A failed introspection counts as expired.
    pub async fn ensure_fresh(&self, token: String) -> Result<String, Error> {
        match self.remaining_lifetime(&token).await {
            Ok(remaining) if remaining >= MIN_TOKEN_LIFETIME_SECS => Ok(token),
            Ok(_) => self.issue_new_token().await,
            Err(err) => {
                if !token.is_empty() {
                    warn!("Treating access token as expired: {}", err);
                }
                self.issue_new_token().await
            }
        }
    }
}

fn auth_error(err: reqwest::Error) -> Error {
    Error::Auth {
        message: err.to_string(),
    }
}
