use anyhow::Result;

use crate::ai::tools::calendar::render_slots;
use crate::calendar::CalendarClient;
use crate::core::AppConfig;

pub async fn run(config: &AppConfig, duration: i64, timezone: Option<String>) -> Result<()> {
    let client = CalendarClient::from_config(config)?;
    let slots = client.find_free_slots(duration, timezone.as_deref()).await?;
    println!("{}", render_slots(&slots));
    Ok(())
}
