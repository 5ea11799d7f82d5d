//! Desktop alert delivery through the system notification daemon

use tokio::process::Command;
use tracing::{debug, info};

/// Show a desktop notification with `notify-send`
pub async fn send_desktop_notification(title: &str, body: &str) -> Result<(), String> {
    debug!("Sending desktop notification: {}", title);
    
    let output = Command::new("notify-send")
        .args(["--app-name=pomo-keeper", title, body])
        .output()
        .await
        .map_err(|e| format!("Failed to execute notify-send: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("notify-send failed: {}", stderr));
    }

    Ok(())
}

/// Check if notify-send is available on the system
pub async fn check_notify_send_available() -> Result<(), String> {
    Command::new("notify-send")
        .arg("--version")
        .output()
        .await
        .map_err(|_| "notify-send is not available; desktop alerts will be skipped.".to_string())?;
    
    info!("notify-send is available");
    Ok(())
}
