//! OAuth credential persistence and refresh for the calendar API.
//!
//! Tokens live in one JSON file per (service, version, profile) under
//! the configured token directory. `CredentialStore::obtain` hands back
//! a usable credential, refreshing or re-authorizing as needed, and
//! `CachedCredential` keeps it in memory for the life of a session.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    callback::CallbackServer,
    oauth::{
        CALENDAR_SCOPE, ClientSecret, TokenResponse, authorization_url, exchange_code_for_token,
        refresh_access_token,
    },
};
use crate::calendar::CalendarError;

/// Tokens count as expired this long before their recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    /// Build a credential from a token endpoint response. Google
    /// usually omits the refresh token on a refresh grant, in which
    /// case `previous_refresh_token` is carried over.
    pub fn from_token_response(
        resp: TokenResponse,
        previous_refresh_token: Option<String>,
        requested_scopes: &[String],
    ) -> Self {
        let scopes = match resp.scope {
            Some(scope) => scope.split_whitespace().map(String::from).collect(),
            None => requested_scopes.to_vec(),
        };
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(previous_refresh_token),
            expiry: resp
                .expires_in
                .map(|secs| Utc::now() + TimeDelta::seconds(secs)),
            scopes,
        }
    }

    /// A credential without a recorded expiry is assumed valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + TimeDelta::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn covers(&self, scopes: &[String]) -> bool {
        scopes.iter().all(|scope| self.scopes.contains(scope))
    }
}

/// Identifies which token file to use.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub service: String,
    pub version: String,
    pub scopes: Vec<String>,
    pub profile: Option<String>,
}

impl TokenRequest {
    pub fn calendar(profile: Option<String>) -> Self {
        Self {
            service: String::from("calendar"),
            version: String::from("v3"),
            scopes: vec![CALENDAR_SCOPE.to_string()],
            profile,
        }
    }

    pub fn file_name(&self) -> String {
        let suffix = self
            .profile
            .as_deref()
            .map(|p| format!("_{}", p))
            .unwrap_or_default();
        format!("token_{}_{}{}.json", self.service, self.version, suffix)
    }
}

/// Interactive authorization. Implementations need user action so
/// callers must never retry automatically.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        secret: &ClientSecret,
        scopes: &[String],
    ) -> Result<Credential, CalendarError>;
}

/// Prints the consent URL and waits for Google to redirect back to a
/// local callback server.
pub struct LoopbackAuthorizer {
    timeout: Duration,
}

impl Default for LoopbackAuthorizer {
    fn default() -> Self {
        Self {
            timeout: AUTHORIZATION_TIMEOUT,
        }
    }
}

impl LoopbackAuthorizer {
    async fn run(&self, secret: &ClientSecret, scopes: &[String]) -> anyhow::Result<Credential> {
        let server = CallbackServer::bind().await?;
        let redirect_uri = server.redirect_uri();
        let state = Uuid::new_v4().to_string();
        let url = authorization_url(secret, &redirect_uri, scopes, &state);

        println!("Open this URL in your browser to grant calendar access:\n\n{}\n", url);
        info!(port = server.port(), "Waiting for OAuth callback");

        let code = server.wait_for_code(state, self.timeout).await?;
        let token = exchange_code_for_token(secret, &code, &redirect_uri).await?;
        Ok(Credential::from_token_response(token, None, scopes))
    }
}

#[async_trait]
impl Authorizer for LoopbackAuthorizer {
    async fn authorize(
        &self,
        secret: &ClientSecret,
        scopes: &[String],
    ) -> Result<Credential, CalendarError> {
        self.run(secret, scopes)
            .await
            .map_err(|e| CalendarError::authentication(e.to_string()))
    }
}

pub struct CredentialStore {
    token_dir: PathBuf,
    client_secret_path: PathBuf,
    authorizer: Box<dyn Authorizer>,
}

impl CredentialStore {
    pub fn new(token_dir: impl Into<PathBuf>, client_secret_path: impl Into<PathBuf>) -> Self {
        Self::with_authorizer(
            token_dir,
            client_secret_path,
            Box::new(LoopbackAuthorizer::default()),
        )
    }

    pub fn with_authorizer(
        token_dir: impl Into<PathBuf>,
        client_secret_path: impl Into<PathBuf>,
        authorizer: Box<dyn Authorizer>,
    ) -> Self {
        Self {
            token_dir: token_dir.into(),
            client_secret_path: client_secret_path.into(),
            authorizer,
        }
    }

    pub fn token_path(&self, request: &TokenRequest) -> PathBuf {
        self.token_dir.join(request.file_name())
    }

    pub fn load(&self, path: &Path) -> Option<Credential> {
        let shown = path.display().to_string();
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %shown, "token file not found");
                return None;
            }
            Err(e) => {
                warn!(path = %shown, error = %e, "token file read failed");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(credential) => {
                debug!(path = %shown, "credential loaded");
                Some(credential)
            }
            Err(e) => {
                warn!(path = %shown, error = %e, "token file parse failed");
                None
            }
        }
    }

    pub fn save(&self, path: &Path, credential: &Credential) -> anyhow::Result<()> {
        let shown = path.display().to_string();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(credential)?;
        std::fs::write(path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(path = %shown, "credential saved");
        Ok(())
    }

    fn client_secret(&self) -> Result<ClientSecret, CalendarError> {
        ClientSecret::from_file(&self.client_secret_path)
            .map_err(|e| CalendarError::authentication(e.to_string()))
    }

    /// Return a credential that is valid right now.
    ///
    /// An unexpired token file is used as is. An expired one is
    /// refreshed when it carries a refresh token. Anything else falls
    /// through to the interactive flow. The result is always written
    /// back to the token file.
    pub async fn obtain(&self, request: &TokenRequest) -> Result<Credential, CalendarError> {
        std::fs::create_dir_all(&self.token_dir).map_err(|e| {
            CalendarError::authentication(format!(
                "could not create token directory {}: {}",
                self.token_dir.display(),
                e
            ))
        })?;

        let path = self.token_path(request);
        let existing = self.load(&path);

        if let Some(credential) = &existing
            && !credential.is_expired()
            && credential.covers(&request.scopes)
        {
            return Ok(credential.clone());
        }

        let secret = self.client_secret()?;

        if let Some(credential) = existing
            && let Some(refresh_token) = credential.refresh_token
        {
            match refresh_access_token(&secret, &refresh_token).await {
                Ok(resp) => {
                    info!(path = %path.display(), "access token refreshed");
                    let refreshed =
                        Credential::from_token_response(resp, Some(refresh_token), &request.scopes);
                    self.persist(&path, &refreshed);
                    return Ok(refreshed);
                }
                Err(e) => {
                    warn!(error = %e, "token refresh failed, falling back to interactive login");
                }
            }
        }

        let credential = self.authorizer.authorize(&secret, &request.scopes).await?;
        self.persist(&path, &credential);
        Ok(credential)
    }

    // A credential that can't be written is still good for this run
    fn persist(&self, path: &Path, credential: &Credential) {
        if let Err(e) = self.save(path, credential) {
            warn!(path = %path.display(), error = %e, "failed to save credential");
        }
    }
}

/// Source of bearer tokens for calendar requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, CalendarError>;
}

/// Obtains a credential on first use and re-checks its expiry before
/// every request.
pub struct CachedCredential {
    store: CredentialStore,
    request: TokenRequest,
    cached: Mutex<Option<Credential>>,
}

impl CachedCredential {
    pub fn new(store: CredentialStore, request: TokenRequest) -> Self {
        Self {
            store,
            request,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for CachedCredential {
    async fn access_token(&self) -> Result<String, CalendarError> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref()
            && !credential.is_expired()
        {
            return Ok(credential.access_token.clone());
        }
        let credential = self.store.obtain(&self.request).await?;
        let token = credential.access_token.clone();
        *cached = Some(credential);
        Ok(token)
    }
}
