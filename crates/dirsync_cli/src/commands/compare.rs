//! Compare command implementation.

use dirsync_engine::{paths, StatusAnalyzer, SyncActions, SyncItem};
use serde::Serialize;
use std::path::Path;

/// Action sets by path.
#[derive(Debug, Default, Serialize)]
pub struct ActionsReport {
    /// Local files the other side lacks or has older.
    pub send: Vec<String>,
    /// Files to fetch from the other side.
    pub update: Vec<String>,
    /// Local files deleted on the other side.
    pub delete: Vec<String>,
    /// Files to delete on the other side.
    pub delete_remote: Vec<String>,
    /// Paths changed on both sides.
    pub conflicts: Vec<String>,
}

impl From<&SyncActions> for ActionsReport {
    fn from(actions: &SyncActions) -> Self {
        Self {
            send: owned(&actions.files_to_send),
            update: owned(&actions.files_to_update),
            delete: owned(&actions.files_to_delete),
            delete_remote: owned(&actions.files_to_delete_remote),
            conflicts: actions
                .conflicts
                .iter()
                .map(|c| c.relative_path.clone())
                .collect(),
        }
    }
}

fn owned(items: &[SyncItem]) -> Vec<String> {
    paths(items).into_iter().map(str::to_string).collect()
}

/// Compares the log of `root` with another root's log file.
pub fn run(root: &Path, other_log: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !other_log.is_file() {
        return Err(format!("No operation log at {}", other_log.display()).into());
    }
    let actions = StatusAnalyzer::new(root).compare(other_log)?;
    let report = ActionsReport::from(&actions);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            if actions.is_empty() {
                println!("In sync");
                return Ok(());
            }
            let sections = [
                ("Send", &report.send),
                ("Update", &report.update),
                ("Delete", &report.delete),
                ("Delete remote", &report.delete_remote),
                ("Conflicts", &report.conflicts),
            ];
            for (title, list) in sections {
                if list.is_empty() {
                    continue;
                }
                println!("{title} ({}):", list.len());
                for path in list {
                    println!("  {path}");
                }
            }
        }
    }
    Ok(())
}
