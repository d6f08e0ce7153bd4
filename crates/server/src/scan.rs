use std::time::SystemTime;

use library::{LibraryError, ScanSummary};
use tracing::{info, warn};

use crate::state::{AppState, ScanStatus};

/// Runs one reconcile pass on a blocking thread and records the outcome.
pub async fn run_scan(state: &AppState) -> Result<ScanSummary, String> {
    *state.scan_status.write() = ScanStatus::Scanning {
        started: SystemTime::now(),
    };

    let library = state.library.clone();
    let result = tokio::task::spawn_blocking(move || {
        let summary = library.run_scan()?;
        let stats = library.stats()?;
        Ok::<_, LibraryError>((summary, stats))
    })
    .await;

    match result {
        Ok(Ok((summary, stats))) => {
            info!(
                "Library ready: {} artists, {} albums, {} tracks",
                stats.artists, stats.albums, stats.tracks
            );
            *state.scan_status.write() = ScanStatus::Finished(summary);
            Ok(summary)
        }
        Ok(Err(err)) => {
            let message = err.to_string();
            warn!("Library scan failed: {}", message);
            *state.scan_status.write() = ScanStatus::Failed(message.clone());
            Err(message)
        }
        Err(err) => {
            let message = err.to_string();
            warn!("Library scan join error: {}", message);
            *state.scan_status.write() = ScanStatus::Failed(message.clone());
            Err(message)
        }
    }
}

pub fn start_scan(state: AppState) {
    tokio::spawn(async move {
        let _ = run_scan(&state).await;
    });
}

pub fn describe_status(status: &ScanStatus) -> (String, Option<ScanSummary>) {
    match status {
        ScanStatus::Idle => ("idle".to_string(), None),
        ScanStatus::Scanning { started } => {
            let secs = started.elapsed().map(|value| value.as_secs()).unwrap_or(0);
            (format!("scanning ({}s)", secs), None)
        }
        ScanStatus::Finished(summary) => ("ready".to_string(), Some(*summary)),
        ScanStatus::Failed(message) => (format!("failed: {}", message), None),
    }
}
