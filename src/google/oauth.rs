//! Google OAuth 2.0 for installed applications: client secrets, the
//! authorization URL, and the token endpoint.

use std::path::Path;

use anyhow::{Result, anyhow};
use serde::Deserialize;

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// The OAuth client downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)?;
        file.installed
            .or(file.web)
            .ok_or(anyhow!("Client secret has neither an `installed` nor a `web` section"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read client secret {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }
}

/// Response body from the token endpoint. A refresh grant usually
/// omits `refresh_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

pub fn authorization_url(
    secret: &ClientSecret,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
        secret.auth_uri,
        urlencoding::encode(&secret.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
        urlencoding::encode(state),
    )
}

async fn token_request(token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
    let res = reqwest::Client::new()
        .post(token_uri)
        .form(form)
        .send()
        .await?;
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("Token request failed: {} ({})", status, text);
    }
    Ok(serde_json::from_str(&text)?)
}

pub async fn exchange_code_for_token(
    secret: &ClientSecret,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    token_request(
        &secret.token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
        ],
    )
    .await
}

pub async fn refresh_access_token(
    secret: &ClientSecret,
    refresh_token: &str,
) -> Result<TokenResponse> {
    token_request(
        &secret.token_uri,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
        ],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const INSTALLED: &str = r#"{
        "installed": {
            "client_id": "client-123.apps.googleusercontent.com",
            "project_id": "calendar-assistant",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn it_reads_installed_client_secrets() {
        let secret = ClientSecret::from_json(INSTALLED).unwrap();
        assert_eq!(secret.client_id, "client-123.apps.googleusercontent.com");
        assert_eq!(secret.client_secret, "shh");
        assert_eq!(secret.auth_uri, "https://accounts.google.com/o/oauth2/auth");
    }

    #[test]
    fn it_reads_web_client_secrets_with_defaults() {
        let secret =
            ClientSecret::from_json(r#"{"web": {"client_id": "id", "client_secret": "s"}}"#)
                .unwrap();
        assert_eq!(secret.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(secret.auth_uri, GOOGLE_AUTH_URI);
    }

    #[test]
    fn it_rejects_unknown_client_secret_layouts() {
        assert!(ClientSecret::from_json(r#"{"other": {}}"#).is_err());
    }

    #[test]
    fn it_builds_the_authorization_url() {
        let secret = ClientSecret::from_json(INSTALLED).unwrap();
        let url = authorization_url(
            &secret,
            "http://127.0.0.1:8765/auth/callback",
            &[CALENDAR_SCOPE.to_string()],
            "state-1",
        );
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A8765%2Fauth%2Fcallback"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fcalendar"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains("access_type=offline"));
    }

    #[tokio::test]
    async fn it_refreshes_an_access_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "fresh", "expires_in": 3599, "token_type": "Bearer"}"#)
            .create_async()
            .await;

        let secret = ClientSecret {
            client_id: String::from("id"),
            client_secret: String::from("secret"),
            auth_uri: default_auth_uri(),
            token_uri: format!("{}/token", server.url()),
        };
        let token = refresh_access_token(&secret, "refresh-1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.expires_in, Some(3599));
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn it_reports_token_endpoint_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let secret = ClientSecret {
            client_id: String::from("id"),
            client_secret: String::from("secret"),
            auth_uri: default_auth_uri(),
            token_uri: format!("{}/token", server.url()),
        };
        let err = refresh_access_token(&secret, "revoked").await.unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }
}
