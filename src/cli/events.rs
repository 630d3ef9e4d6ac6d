use anyhow::Result;

use crate::ai::tools::calendar::render_events;
use crate::calendar::CalendarClient;
use crate::core::AppConfig;

pub async fn run(config: &AppConfig, max_results: u32) -> Result<()> {
    let client = CalendarClient::from_config(config)?;
    let events = client.list_upcoming(max_results).await?;
    println!("{}", render_events(&events));
    Ok(())
}
