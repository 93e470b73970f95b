use reqwest::StatusCode;
use tracing::info;

use crate::cli::commands::CancelArgs;
use crate::config::LanternConfig;
use crate::errors::LanternError;

pub async fn handle_cancel(args: CancelArgs, config: LanternConfig) -> Result<(), LanternError> {
    let base = args
        .server
        .unwrap_or_else(|| format!("http://{}", config.bind_addr()));
    let url = format!("{}/api/jobs/{}/cancel", base.trim_end_matches('/'), args.job_id);
    info!(job_id = %args.job_id, url = %url, "Requesting cancel");

    let response = reqwest::Client::new()
        .post(&url)
        .send()
        .await
        .map_err(|e| LanternError::Network(format!("Failed to reach {}: {}", base, e)))?;

    match response.status() {
        StatusCode::NOT_FOUND => Err(LanternError::NotFound(format!("job {}", args.job_id))),
        status if status.is_success() => {
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| LanternError::Network(format!("Bad response: {}", e)))?;
            if body["cancel_requested"].as_bool().unwrap_or(false) {
                println!("Cancel requested for job {}", args.job_id);
            } else {
                println!("Job {} already finished ({})", args.job_id, body["state"].as_str().unwrap_or("unknown"));
            }
            Ok(())
        }
        status => Err(LanternError::Network(format!("Server answered {}", status))),
    }
}
