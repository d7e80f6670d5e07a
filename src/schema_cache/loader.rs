//! Local schema file loading, split out from [`super::SchemaCache`] so the directory
//! layout and path-joining rules have one place to live and test.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolves `file` against `schema_dir` and reads it. `file` is expected to be a bare
/// filename (e.g. `products.graphql`); any path components in it are still honoured so a
/// subdirectory layout under `schema_dir` works, but `..` segments are rejected to keep
/// the schema directory from being escaped by a subgraph config entry.
pub async fn load_local_file(schema_dir: &Path, file: &str) -> Result<String> {
    let relative = Path::new(file);
    if relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        anyhow::bail!("schema file path '{file}' must not contain '..' segments");
    }

    let path: PathBuf = schema_dir.join(relative);
    tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading schema file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_relative_to_schema_dir() {
        let dir = std::env::temp_dir().join(format!(
            "subgraph-proxy-loader-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("products.graphql"), "type Query { ok: Boolean }").unwrap();

        let sdl = load_local_file(&dir, "products.graphql").await.unwrap();
        assert_eq!(sdl, "type Query { ok: Boolean }");

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn rejects_parent_dir_escape() {
        let dir = std::env::temp_dir().join(format!(
            "subgraph-proxy-loader-escape-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let result = load_local_file(&dir, "../escape.graphql").await;
        assert!(result.is_err());

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = std::env::temp_dir();
        let result = load_local_file(&dir, "does-not-exist-at-all.graphql").await;
        assert!(result.is_err());
    }
}
