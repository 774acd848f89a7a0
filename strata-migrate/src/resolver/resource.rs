//! Sources of migration scripts.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StrataResult;

/// A script loaded from a migration location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// File name without directories.
    pub filename: String,
    /// Where the resource was found.
    pub physical_location: String,
    /// Script text.
    pub content: String,
}

impl Resource {
    /// Create a resource.
    pub fn new(
        filename: impl Into<String>,
        physical_location: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            physical_location: physical_location.into(),
            content: content.into(),
        }
    }
}

/// Lists scripts by file name prefix and suffix.
#[async_trait::async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Resources whose file name starts with `prefix` and ends with one of
    /// `suffixes`, sorted by physical location.
    async fn resources(&self, prefix: &str, suffixes: &[String]) -> StrataResult<Vec<Resource>>;
}

fn matches_name(filename: &str, prefix: &str, suffixes: &[String]) -> bool {
    filename.starts_with(prefix) && suffixes.iter().any(|s| filename.ends_with(s.as_str()))
}

/// Scans directories recursively.
#[derive(Debug, Clone, Default)]
pub struct FileSystemResourceProvider {
    locations: Vec<PathBuf>,
}

impl FileSystemResourceProvider {
    /// Create a provider over the given directories.
    pub fn new<I, P>(locations: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            locations: locations.into_iter().map(Into::into).collect(),
        }
    }

    /// Scanned directories.
    pub fn locations(&self) -> &[PathBuf] {
        &self.locations
    }

    async fn scan(root: &Path) -> StrataResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(entry.path());
                }
            }
        }
        Ok(files)
    }
}

#[async_trait::async_trait]
impl ResourceProvider for FileSystemResourceProvider {
    async fn resources(&self, prefix: &str, suffixes: &[String]) -> StrataResult<Vec<Resource>> {
        let mut resources = Vec::new();
        for location in &self.locations {
            if !tokio::fs::try_exists(location).await.unwrap_or(false) {
                warn!(location = %location.display(), "Skipping missing migration location");
                continue;
            }

            for path in Self::scan(location).await? {
                let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !matches_name(filename, prefix, suffixes) {
                    continue;
                }
                let content = tokio::fs::read_to_string(&path).await?;
                resources.push(Resource::new(
                    filename,
                    path.display().to_string(),
                    content,
                ));
            }
        }
        resources.sort_by(|a, b| a.physical_location.cmp(&b.physical_location));
        debug!(count = resources.len(), prefix, "Scanned migration locations");
        Ok(resources)
    }
}

/// Serves scripts held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticResourceProvider {
    resources: Vec<Resource>,
}

impl StaticResourceProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a script under `filename`.
    pub fn with(mut self, filename: impl Into<String>, content: impl Into<String>) -> Self {
        let filename = filename.into();
        let location = format!("static:{}", filename);
        self.resources.push(Resource::new(filename, location, content));
        self
    }

    /// Add a resource.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }
}

#[async_trait::async_trait]
impl ResourceProvider for StaticResourceProvider {
    async fn resources(&self, prefix: &str, suffixes: &[String]) -> StrataResult<Vec<Resource>> {
        let mut resources: Vec<Resource> = self
            .resources
            .iter()
            .filter(|r| matches_name(&r.filename, prefix, suffixes))
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.physical_location.cmp(&b.physical_location));
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql() -> Vec<String> {
        vec![".sql".to_string()]
    }

    #[tokio::test]
    async fn test_file_system_scan_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("v2");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("V1__init.sql"), "CREATE TABLE a (id INT);").unwrap();
        std::fs::write(nested.join("V2__more.sql"), "CREATE TABLE b (id INT);").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let provider = FileSystemResourceProvider::new([dir.path()]);
        let resources = provider.resources("V", &sql()).await.unwrap();
        let names: Vec<&str> = resources.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["V1__init.sql", "V2__more.sql"]);
        assert_eq!(resources[0].content, "CREATE TABLE a (id INT);");
    }

    #[tokio::test]
    async fn test_missing_location_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSystemResourceProvider::new([dir.path().join("absent")]);
        assert!(provider.resources("", &sql()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_provider_filters() {
        let provider = StaticResourceProvider::new()
            .with("V1__init.sql", "SELECT 1;")
            .with("R__views.sql", "SELECT 2;")
            .with("V2__data.csv", "1,2");
        let resources = provider.resources("V", &sql()).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].physical_location, "static:V1__init.sql");
    }
}
