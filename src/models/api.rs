//! Analysis API Models
//!
//! Request and response bodies of the Code Historian REST API. All bodies
//! use camelCase keys on the wire.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::settings::HistorianSettings;

/// Body of `POST /api/analysis/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisRequest {
    pub project_path: String,
    pub max_depth: u32,
    pub excluded_paths: Vec<String>,
}

impl StartAnalysisRequest {
    /// Build a request for `project_path` from the current settings.
    pub fn from_settings(project_path: impl Into<String>, settings: &HistorianSettings) -> Self {
        Self {
            project_path: project_path.into(),
            max_depth: settings.max_history_depth,
            excluded_paths: settings.excluded_paths.clone(),
        }
    }
}

/// Response of `POST /api/analysis/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAnalysisResponse {
    /// Opaque session id
    pub id: String,
    #[serde(default)]
    pub status: String,
    /// RFC 3339 timestamp assigned by the server
    #[serde(default)]
    pub start_time: Option<String>,
}

/// One recorded change of a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub timestamp: String,
    pub author: String,
    pub message: String,
    #[serde(default)]
    pub impact_score: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetrics {
    pub total_changes: u64,
    pub total_authors: u64,
    pub avg_impact_score: f64,
}

/// Response of `GET /api/history/file`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistory {
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub metrics: FileMetrics,
}

/// A frequently changed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub file_path: String,
    pub score: f64,
    pub changes: u64,
    pub authors: u64,
}

/// Response of `GET /api/metrics/project`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetrics {
    pub total_files: u64,
    pub total_commits: u64,
    pub total_authors: u64,
    pub avg_commits_per_file: f64,
    pub avg_authors_per_file: f64,
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
}

/// Response of `GET /api/metrics/custom/{key}`
pub type CustomMetrics = HashMap<String, f64>;
