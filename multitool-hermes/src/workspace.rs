//! Workspace persistence module
//!
//! Saves and restores workflow definitions as JSON files in the nexus
//! directory.

use multitool_libs::{AppError, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Workspace manager for persistence
pub struct WorkspaceManager {
    /// Directory where workspaces are stored
    nexus_dir: PathBuf,
}

impl WorkspaceManager {
    /// Create a new workspace manager
    ///
    /// # Arguments
    ///
    /// * `nexus_dir` - Path to the nexus directory
    pub fn new<P: AsRef<Path>>(nexus_dir: P) -> Self {
        let nexus_dir = nexus_dir.as_ref().to_path_buf();

        if !nexus_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(&nexus_dir) {
                warn!("Failed to create nexus directory: {}", e);
            }
        }

        Self { nexus_dir }
    }

    fn file_path(&self, name: &str) -> Result<PathBuf, AppError> {
        let sanitized = sanitize_filename(name);
        if sanitized.is_empty() {
            return Err(AppError::BadRequest(
                "Workspace name cannot be empty".to_string(),
            ));
        }
        Ok(self.nexus_dir.join(format!("{}.json", sanitized)))
    }

    /// Save a workflow under `name`, replacing any previous version
    ///
    /// # Returns
    ///
    /// * `Ok(())` if saved successfully
    /// * `Err(AppError)` if the name is invalid or the write failed
    pub async fn save_workspace(
        &self,
        name: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<(), AppError> {
        let file_path = self.file_path(name)?;
        info!("Saving workspace to: {:?}", file_path);

        let json = serde_json::to_string_pretty(workflow)?;
        fs::write(&file_path, json)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write workspace file: {}", e)))?;

        info!(
            "Workspace '{}' saved ({} nodes, {} edges)",
            name,
            workflow.nodes.len(),
            workflow.edges.len()
        );
        Ok(())
    }

    /// Load a workspace
    ///
    /// # Returns
    ///
    /// * `Ok(WorkflowDefinition)` - Loaded workflow
    /// * `Err(AppError::NotFound)` - No workspace with that name
    pub async fn load_workspace(&self, name: &str) -> Result<WorkflowDefinition, AppError> {
        let file_path = self.file_path(name)?;
        if !file_path.exists() {
            return Err(AppError::NotFound(format!("Workspace '{}' not found", name)));
        }

        info!("Loading workspace from: {:?}", file_path);

        let contents = fs::read_to_string(&file_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read workspace file: {}", e)))?;
        let workflow: WorkflowDefinition = serde_json::from_str(&contents)
            .map_err(|e| AppError::Internal(format!("Failed to parse workspace data: {}", e)))?;

        info!("Workspace '{}' loaded successfully", name);
        Ok(workflow)
    }

    /// List all available workspaces, sorted by name
    pub async fn list_workspaces(&self) -> Result<Vec<String>, AppError> {
        if !self.nexus_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.nexus_dir).await.map_err(|e| {
            AppError::Internal(format!("Failed to read nexus directory: {}", e))
        })?;

        let mut workspaces = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                workspaces.push(name.to_string());
            }
        }

        workspaces.sort();
        Ok(workspaces)
    }

    /// Delete a workspace
    ///
    /// # Returns
    ///
    /// * `Ok(())` if deleted successfully
    /// * `Err(AppError::NotFound)` if there is no such workspace
    pub async fn delete_workspace(&self, name: &str) -> Result<(), AppError> {
        let file_path = self.file_path(name)?;
        if !file_path.exists() {
            return Err(AppError::NotFound(format!("Workspace '{}' not found", name)));
        }

        fs::remove_file(&file_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to delete workspace file: {}", e)))?;

        info!("Workspace '{}' deleted successfully", name);
        Ok(())
    }
}

/// Request to save the current workflow
#[derive(Debug, Deserialize)]
pub struct SaveWorkspaceRequest {
    /// Workspace name
    pub name: String,
}

/// Response for workspace list endpoint
#[derive(Debug, Serialize)]
pub struct WorkspaceListResponse {
    /// List of workspace names
    pub workspaces: Vec<String>,
}

/// Sanitize a filename by replacing invalid characters
fn sanitize_filename(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
