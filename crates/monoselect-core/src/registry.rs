//! Component discovery and loading.
//!
//! Descriptors live at `<root>/.buildkite/pipeline.<name>.yml` (or `.yaml`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::component::Component;
use crate::error::{Result, SelectError};
use crate::graph::sort_components;

/// Directory holding descriptors, relative to the repository root.
pub const DESCRIPTOR_DIR: &str = ".buildkite";

/// A descriptor file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFile {
    /// `/`-separated path relative to the repository root.
    pub relative_path: String,
    /// `<name>` from `pipeline.<name>.yml`.
    pub file_name: String,
}

fn descriptor_name(file_name: &str) -> Option<&str> {
    let stem = file_name
        .strip_suffix(".yml")
        .or_else(|| file_name.strip_suffix(".yaml"))?;
    stem.strip_prefix("pipeline.").filter(|n| !n.is_empty())
}

/// Loads components from a repository checkout.
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
}

impl Registry {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Descriptor files sorted by path. A missing descriptor directory yields
    /// an empty list.
    pub async fn descriptor_files(&self) -> Result<Vec<DescriptorFile>> {
        let dir = self.root.join(DESCRIPTOR_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(name) = descriptor_name(&file_name) {
                files.push(DescriptorFile {
                    relative_path: format!("{DESCRIPTOR_DIR}/{file_name}"),
                    file_name: name.to_string(),
                });
            }
        }
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(files)
    }

    async fn load_file(&self, file: &DescriptorFile) -> Result<Component> {
        let text = tokio::fs::read_to_string(self.root.join(&file.relative_path))
            .await
            .map_err(|e| SelectError::Config {
                path: file.relative_path.clone(),
                detail: format!("unreadable: {e}"),
            })?;
        Component::from_yaml(&file.relative_path, Some(&file.file_name), &text)
    }

    /// Load, validate and order every component.
    ///
    /// Malformed descriptors are skipped with a warning. Duplicate names,
    /// list-shaped `env`, unresolved references and cycles are fatal.
    pub async fn load_all(&self) -> Result<Vec<Component>> {
        let files = self.descriptor_files().await?;
        if files.is_empty() {
            return Err(SelectError::NoPipelineFiles(
                self.root.join(DESCRIPTOR_DIR).display().to_string(),
            ));
        }

        let mut by_name: BTreeMap<String, Component> = BTreeMap::new();
        for file in &files {
            let component = match self.load_file(file).await {
                Ok(component) => component,
                Err(e @ SelectError::Config { .. }) => {
                    warn!(path = %file.relative_path, error = %e, "skipping component descriptor");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(existing) = by_name.get(&component.name) {
                return Err(SelectError::DuplicateComponent {
                    name: component.name.clone(),
                    first: existing.descriptor_path.clone(),
                    second: component.descriptor_path.clone(),
                });
            }
            debug!(component = %component.name, path = %file.relative_path, "loaded component");
            by_name.insert(component.name.clone(), component);
        }

        sort_components(by_name.into_values().collect())
    }

    /// Load one component by name, without resolving its references.
    pub async fn load_one(&self, name: &str) -> Result<Component> {
        let files = self.descriptor_files().await?;

        // Try the conventional file first, then any descriptor declaring the name.
        let (conventional, others): (Vec<_>, Vec<_>) =
            files.iter().partition(|f| f.file_name == name);
        for file in conventional.into_iter().chain(others) {
            match self.load_file(file).await {
                Ok(component) if component.name == name => return Ok(component),
                Ok(_) => {}
                Err(e @ SelectError::Config { .. }) => {
                    debug!(path = %file.relative_path, error = %e, "skipping component descriptor");
                }
                Err(e) => return Err(e),
            }
        }

        Err(SelectError::ComponentNotFound(name.to_string()))
    }
}
