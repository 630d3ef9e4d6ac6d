//! Local receiver for the OAuth redirect.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Result, anyhow, bail};
use axum::{Router, extract::Query, response::Html, routing::get};
use tokio::{net::TcpListener, sync::oneshot};

const CALLBACK_PATH: &str = "/auth/callback";

/// One-shot HTTP server on `127.0.0.1` that waits for Google to
/// redirect back with an authorization code.
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

impl CallbackServer {
    /// Bind to an OS-assigned port so the redirect URI can be built
    /// before the browser is sent anywhere.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, CALLBACK_PATH)
    }

    /// Wait for a GET with `code` and `state` params, check `state`
    /// against `expected_state` and return the code.
    pub async fn wait_for_code(self, expected_state: String, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel::<Result<String>>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));

        let app = Router::new().route(
            CALLBACK_PATH,
            get(move |Query(params): Query<HashMap<String, String>>| {
                let tx = tx.lock().unwrap_or_else(|e| e.into_inner()).take();
                async move {
                    let result: Result<String, String> = (|| {
                        if let Some(error) = params.get("error") {
                            return Err(format!("authorization denied: {}", error));
                        }
                        let state = params.get("state").ok_or("missing state")?;
                        if *state != expected_state {
                            return Err(String::from("state mismatch"));
                        }
                        let code = params.get("code").ok_or("missing code")?;
                        Ok(code.clone())
                    })();

                    match result {
                        Ok(code) => {
                            if let Some(tx) = tx {
                                let _ = tx.send(Ok(code));
                            }
                            Html(String::from(
                                "<h1>Calendar access granted</h1><p>You can close this window.</p>",
                            ))
                        }
                        Err(e) => {
                            if let Some(tx) = tx {
                                let _ = tx.send(Err(anyhow!("{}", e)));
                            }
                            // The reason stays in the terminal, the page is fixed text
                            Html(String::from(
                                "<h1>Authentication failed</h1><p>Return to the terminal for details.</p>",
                            ))
                        }
                    }
                }
            }),
        );

        let server = axum::serve(self.listener, app);

        tokio::select! {
            result = rx => {
                result?
            }
            _ = server.into_future() => {
                bail!("OAuth callback server exited unexpectedly")
            }
            _ = tokio::time::sleep(timeout) => {
                bail!("OAuth callback timed out after {} seconds", timeout.as_secs())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_returns_the_code_for_a_matching_state() {
        let server = CallbackServer::bind().await.unwrap();
        let url = format!("{}?code=abc123&state=expected", server.redirect_uri());
        let handle = tokio::spawn(
            server.wait_for_code(String::from("expected"), Duration::from_secs(5)),
        );

        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Calendar access granted"));

        let code = handle.await.unwrap().unwrap();
        assert_eq!(code, "abc123");
    }

    #[tokio::test]
    async fn it_rejects_a_mismatched_state() {
        let server = CallbackServer::bind().await.unwrap();
        let url = format!("{}?code=abc123&state=forged", server.redirect_uri());
        let handle = tokio::spawn(
            server.wait_for_code(String::from("expected"), Duration::from_secs(5)),
        );

        let res = reqwest::get(&url).await.unwrap();
        assert!(res.status().is_success());

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
    }

    #[tokio::test]
    async fn it_does_not_echo_provider_errors_into_the_page() {
        let server = CallbackServer::bind().await.unwrap();
        let url = format!(
            "{}?error=%3Cscript%3Ealert(1)%3C%2Fscript%3E",
            server.redirect_uri()
        );
        let handle = tokio::spawn(
            server.wait_for_code(String::from("expected"), Duration::from_secs(5)),
        );

        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Authentication failed"));
        assert!(!body.contains("<script>"));

        let err = handle.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("authorization denied: <script>"));
    }

    #[tokio::test]
    async fn it_times_out() {
        let server = CallbackServer::bind().await.unwrap();
        let err = server
            .wait_for_code(String::from("expected"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
