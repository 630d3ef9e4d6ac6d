use anyhow::Result;

use crate::core::AppConfig;
use crate::google::credentials::{CredentialStore, TokenRequest};

pub async fn run(config: &AppConfig, profile: Option<String>) -> Result<()> {
    let profile = profile.or_else(|| config.token_profile.clone());
    let store = CredentialStore::new(config.token_dir(), &config.client_secret_path);
    let request = TokenRequest::calendar(profile);

    let credential = store.obtain(&request).await?;

    println!("Calendar access authorized.");
    println!("Token file: {}", store.token_path(&request).display());
    if let Some(expiry) = credential.expiry {
        println!("Access token expires at {}", expiry.to_rfc3339());
    }
    Ok(())
}
