use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{IdentityProvider, ProviderError, ProviderToken};
use crate::account::UserProfile;
use crate::codegen;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USERINFO_URL: &str = "https://api.github.com/user";
const USER_AGENT: &str = concat!("devauth/", env!("CARGO_PKG_VERSION"));

fn default_enabled() -> bool {
    true
}

/// Settings for a standard authorization-code OAuth 2.0 provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2ProviderConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub redirect_url: String,
    #[serde(default)]
    pub error_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Fixed CSRF state. Generated at startup when empty.
    #[serde(default)]
    pub state: String,
}

impl OAuth2ProviderConfig {
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            name: "google".to_string(),
            enabled: true,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            redirect_url: redirect_url.into(),
            error_url: String::new(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            state: String::new(),
        }
    }

    pub fn github(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            name: "github".to_string(),
            enabled: true,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: GITHUB_AUTH_URL.to_string(),
            token_url: GITHUB_TOKEN_URL.to_string(),
            userinfo_url: GITHUB_USERINFO_URL.to_string(),
            redirect_url: redirect_url.into(),
            error_url: String::new(),
            scopes: vec!["read:user".to_string(), "user:email".to_string()],
            state: String::new(),
        }
    }
}

/// Configuration-driven [`IdentityProvider`] speaking plain OAuth 2.0.
///
/// # Example
/// ```no_run
/// use devauth::provider::{IdentityProvider, OAuth2Provider, OAuth2ProviderConfig};
///
/// let config = OAuth2ProviderConfig::github("client-id", "secret", "https://app.example.com/callback");
/// let provider = OAuth2Provider::new(config)?;
/// println!("{}", provider.auth_url());
/// # Ok::<(), devauth::provider::ProviderError>(())
/// ```
pub struct OAuth2Provider {
    client: reqwest::Client,
    config: OAuth2ProviderConfig,
    auth_url: Url,
}

impl OAuth2Provider {
    pub fn new(config: OAuth2ProviderConfig) -> Result<Self, ProviderError> {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(
        client: reqwest::Client,
        mut config: OAuth2ProviderConfig,
    ) -> Result<Self, ProviderError> {
        let auth_url = Url::parse(&config.auth_url).map_err(|e| {
            ProviderError::InvalidResponse(format!("invalid auth url for {}: {e}", config.name))
        })?;
        if config.state.is_empty() {
            config.state = codegen::generate_device_code()
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        }
        Ok(Self {
            client,
            config,
            auth_url,
        })
    }

    pub fn config(&self) -> &OAuth2ProviderConfig {
        &self.config
    }

    fn build_auth_url(&self, redirect_url: &str) -> String {
        let mut url = self.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", redirect_url)
                .append_pair("response_type", "code")
                .append_pair("state", &self.config.state);
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
        }
        url.into()
    }

    async fn request_token(
        &self,
        code: &str,
        redirect_url: &str,
    ) -> Result<ProviderToken, ProviderError> {
        let resp = self
            .client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_url),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            let description = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or(error);
            return Err(ProviderError::Rejected(description.to_string()));
        }
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: body.to_string(),
            });
        }
        let token: ProviderToken = serde_json::from_value(body)?;
        if token.access_token.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "token response missing access_token".to_string(),
            ));
        }
        Ok(token)
    }
}

#[async_trait]
impl IdentityProvider for OAuth2Provider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> &str {
        &self.config.state
    }

    fn redirect_url(&self) -> &str {
        &self.config.redirect_url
    }

    fn error_url(&self) -> &str {
        &self.config.error_url
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn exchange(&self, code: &str) -> Result<ProviderToken, ProviderError> {
        self.request_token(code, &self.config.redirect_url).await
    }

    async fn exchange_with_redirect(
        &self,
        code: &str,
        redirect_url: &str,
    ) -> Result<ProviderToken, ProviderError> {
        self.request_token(code, redirect_url).await
    }

    async fn user_info(&self, access_token: &str) -> Result<UserProfile, ProviderError> {
        let resp = self
            .client
            .get(&self.config.userinfo_url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                status: resp.status().as_u16(),
                message: "userinfo request failed".to_string(),
            });
        }
        let body: Value = resp.json().await?;
        profile_from_json(&body)
    }

    fn auth_url(&self) -> String {
        self.build_auth_url(&self.config.redirect_url)
    }

    fn auth_url_with_redirect(&self, redirect_url: &str) -> String {
        self.build_auth_url(redirect_url)
    }
}

/// Pick the canonical fields out of a userinfo document.
fn profile_from_json(body: &Value) -> Result<UserProfile, ProviderError> {
    let id = ["sub", "id"]
        .iter()
        .find_map(|key| match body.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| ProviderError::InvalidResponse("userinfo missing id".to_string()))?;
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    };
    Ok(UserProfile {
        id,
        name: text(&["name", "login"]),
        email: text(&["email"]),
        picture: text(&["picture", "avatar_url"]),
    })
}
