use std::process;

use switchyard_lib::service::StateDocument;
use switchyard_lib::StateService;
use tracing::{error, info, warn};

use crate::server::config::{ServerOverrides, StorageBackend, SwitchyardConfig};
use crate::server::open_stores;

fn state_service(config_path: &str, data_dir: Option<String>) -> StateService {
    let config = SwitchyardConfig::resolve(
        config_path,
        ServerOverrides {
            data_dir,
            ..Default::default()
        },
    )
    .server;
    if config.storage == StorageBackend::Memory {
        warn!("memory storage is configured, nothing outlives this command");
    }
    match open_stores(&config) {
        Ok(stores) => StateService::new(stores),
        Err(e) => {
            error!(error = %e, data_dir = %config.data_dir, "failed to open storage");
            process::exit(1);
        }
    }
}

/// Loads a state document into the data directory the server would use.
pub async fn run_import(
    config_path: &str,
    data_dir: Option<String>,
    file: &str,
    drop: bool,
    user: &str,
) {
    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            error!(file, error = %e, "failed to read state file");
            process::exit(1);
        }
    };
    let document: StateDocument = match serde_json::from_str(&content) {
        Ok(document) => document,
        Err(e) => {
            error!(file, error = %e, "state file is not a valid state document");
            process::exit(1);
        }
    };

    match state_service(config_path, data_dir)
        .import(document, drop, user)
        .await
    {
        Ok(summary) => info!(
            file,
            features = summary.features,
            skipped = summary.skipped_features,
            tags = summary.tags,
            "import finished"
        ),
        Err(e) => {
            error!(file, error = %e, "import failed");
            process::exit(1);
        }
    }
}

/// Writes the state document to `output`, or stdout when none is given.
pub async fn run_export(config_path: &str, data_dir: Option<String>, output: Option<&str>) {
    let document = match state_service(config_path, data_dir).export().await {
        Ok(document) => document,
        Err(e) => {
            error!(error = %e, "export failed");
            process::exit(1);
        }
    };
    let json = match serde_json::to_string_pretty(&document) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "failed to serialize state");
            process::exit(1);
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                error!(path, error = %e, "failed to write export");
                process::exit(1);
            }
            info!(path, features = document.features.len(), "state exported");
        }
        None => println!("{json}"),
    }
}
