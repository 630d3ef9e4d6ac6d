use anyhow::Result;
use calendar_assistant::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
