use anyhow::Result;
use tracing::{info, instrument};

#[instrument(level = "info", err)]
pub async fn check_api(host: &str, port: u16) -> Result<()> {
    reqwest::get(format!("http://{host}:{port}/health"))
        .await?
        .error_for_status()?;
    info!("Success");
    Ok(())
}
