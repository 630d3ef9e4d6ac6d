use std::env;
use std::path::PathBuf;

const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are a helpful Calendar Assistant. Use the available tools when they are needed.";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub client_secret_path: String,
    pub calendar_api_url: String,
    pub calendar_id: String,
    pub default_timezone: String,
    pub token_profile: Option<String>,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: Option<String>,
    pub system_message: String,
}

impl AppConfig {
    /// Directory holding one token file per (service, version, profile).
    pub fn token_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage_path).join("token_files")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("CAL_STORAGE_PATH").unwrap_or("./".to_string());
        let client_secret_path =
            env::var("CAL_CLIENT_SECRET_PATH").unwrap_or("credential.json".to_string());
        let calendar_api_url = env::var("CAL_CALENDAR_API_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string());
        let calendar_id = env::var("CAL_CALENDAR_ID").unwrap_or_else(|_| "primary".to_string());
        let default_timezone =
            env::var("CAL_DEFAULT_TIMEZONE").unwrap_or_else(|_| "Asia/Jakarta".to_string());
        let token_profile = env::var("CAL_TOKEN_PROFILE")
            .ok()
            .filter(|profile| !profile.trim().is_empty());
        let openai_api_hostname =
            env::var("CAL_LLM_HOST").unwrap_or_else(|_| "https://api.openai.com".to_string());
        // The shell asks for a key when this isn't set
        let openai_api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let openai_model =
            env::var("CAL_LLM_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        let system_message =
            env::var("CAL_SYSTEM_MESSAGE").unwrap_or_else(|_| DEFAULT_SYSTEM_MESSAGE.to_string());

        Self {
            storage_path,
            client_secret_path,
            calendar_api_url,
            calendar_id,
            default_timezone,
            token_profile,
            openai_api_hostname,
            openai_api_key,
            openai_model,
            system_message,
        }
    }
}
