//! Analyze and compact commands.

use dirsync_engine::StatusAnalyzer;
use dirsync_protocol::{format_timestamp, Timestamp};
use serde::Serialize;
use std::path::Path;

/// State of a root after an analyze or compact pass.
#[derive(Debug, Serialize)]
pub struct RootReport {
    /// Sync root.
    pub root: String,
    /// Entries appended (analyze) or kept (compact).
    pub entries: usize,
    /// Paths currently tracked, deletions included.
    pub tracked: usize,
    /// Last analyze pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    /// Last compaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_compact: Option<String>,
}

/// Runs the analyze command.
pub fn analyze(root: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let analyzer = StatusAnalyzer::new(root);
    let appended = analyzer.analyze()?;
    if format != "json" {
        for entry in &appended {
            println!("  {} {}", entry.operation, entry.relative_path);
        }
    }
    print_report(&analyzer, appended.len(), "appended", format)
}

/// Runs the compact command.
pub fn compact(root: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let analyzer = StatusAnalyzer::new(root);
    let kept = analyzer.compact()?;
    print_report(&analyzer, kept, "kept", format)
}

fn print_report(
    analyzer: &StatusAnalyzer,
    entries: usize,
    label: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let stamp = |t: Option<Timestamp>| t.as_ref().map(format_timestamp);
    let report = RootReport {
        root: analyzer.root().display().to_string(),
        entries,
        tracked: analyzer.latest_entries()?.len(),
        last_update: stamp(analyzer.last_update_time()?),
        last_compact: stamp(analyzer.last_compact_time()?),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("Root: {}", report.root);
            println!("  Entries {label}: {}", report.entries);
            println!("  Paths tracked: {}", report.tracked);
            println!(
                "  Last update:   {}",
                report.last_update.as_deref().unwrap_or("never")
            );
            println!(
                "  Last compact:  {}",
                report.last_compact.as_deref().unwrap_or("never")
            );
        }
    }
    Ok(())
}
