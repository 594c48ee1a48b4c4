//! Structure document served to clients in structure mode.
//!
//! The document is a client-facing description of the installation (a
//! top-level object with a `floors` array). It comes either inline from
//! configuration or from a file that can be re-read on every request.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::StructureConfig;
use crate::error::BridgeError;

#[derive(Debug)]
enum Source {
    Inline,
    File { path: PathBuf, reload: bool },
}

/// Loaded structure document plus the knowledge of where it came from.
#[derive(Debug)]
pub struct StructureStore {
    source: Source,
    current: RwLock<Value>,
}

impl StructureStore {
    /// Loads and validates the configured document.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if the document is not valid JSON or
    /// lacks a `floors` array, and [`BridgeError::Io`] if the file cannot be
    /// read.
    pub async fn load(config: &StructureConfig) -> Result<Self, BridgeError> {
        match config {
            StructureConfig::Inline(json) => Ok(Self {
                source: Source::Inline,
                current: RwLock::new(parse_document(json)?),
            }),
            StructureConfig::File { path, reload } => {
                let doc = read_document(path).await?;
                Ok(Self {
                    source: Source::File {
                        path: path.clone(),
                        reload: *reload,
                    },
                    current: RwLock::new(doc),
                })
            }
        }
    }

    /// Builds a store around an already parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if the document lacks a `floors` array.
    pub fn from_value(doc: Value) -> Result<Self, BridgeError> {
        validate(&doc)?;
        Ok(Self {
            source: Source::Inline,
            current: RwLock::new(doc),
        })
    }

    /// Returns the document to serve.
    ///
    /// With reloading enabled the backing file is read again; if that
    /// fails the last good document is served.
    pub async fn current(&self) -> Value {
        if let Source::File { path, reload: true } = &self.source {
            match read_document(path).await {
                Ok(doc) => {
                    debug!(path = %path.display(), "structure reloaded");
                    *self.current.write().await = doc.clone();
                    return doc;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "structure reload failed, serving cached copy");
                }
            }
        }
        self.current.read().await.clone()
    }
}

async fn read_document(path: &Path) -> Result<Value, BridgeError> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_document(&text)
}

fn parse_document(text: &str) -> Result<Value, BridgeError> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| BridgeError::Config(format!("structure is not valid JSON: {e}")))?;
    validate(&doc)?;
    Ok(doc)
}

fn validate(doc: &Value) -> Result<(), BridgeError> {
    if doc.get("floors").is_some_and(Value::is_array) {
        Ok(())
    } else {
        Err(BridgeError::Config(
            "structure must be an object with a \"floors\" array".to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::io::Write;

    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn inline_document_loads() {
        let cfg = StructureConfig::Inline(r#"{"floors":[{"name":"ground"}]}"#.to_string());
        let Ok(store) = StructureStore::load(&cfg).await else {
            panic!("inline structure loads");
        };
        assert_eq!(store.current().await["floors"][0]["name"], "ground");
    }

    #[tokio::test]
    async fn documents_without_floors_are_rejected() {
        for bad in [r#"{"rooms":[]}"#, r#"{"floors":{}}"#, "[]", "nope"] {
            let cfg = StructureConfig::Inline(bad.to_string());
            assert!(
                matches!(StructureStore::load(&cfg).await, Err(BridgeError::Config(_))),
                "{bad}"
            );
        }
        assert!(StructureStore::from_value(json!({"x": 1})).is_err());
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let cfg = StructureConfig::File {
            path: PathBuf::from("/definitely/not/here.json"),
            reload: false,
        };
        assert!(matches!(
            StructureStore::load(&cfg).await,
            Err(BridgeError::Io(_))
        ));
    }

    #[tokio::test]
    async fn reload_picks_up_edits_and_survives_bad_ones() {
        let Ok(mut file) = tempfile::NamedTempFile::new() else {
            panic!("tempfile");
        };
        let Ok(()) = write!(file, r#"{{"floors":["v1"]}}"#) else {
            panic!("write");
        };
        let cfg = StructureConfig::File {
            path: file.path().to_path_buf(),
            reload: true,
        };
        let Ok(store) = StructureStore::load(&cfg).await else {
            panic!("file structure loads");
        };
        assert_eq!(store.current().await, json!({"floors": ["v1"]}));

        let Ok(()) = std::fs::write(file.path(), r#"{"floors":["v2"]}"#) else {
            panic!("rewrite");
        };
        assert_eq!(store.current().await, json!({"floors": ["v2"]}));

        let Ok(()) = std::fs::write(file.path(), "{broken") else {
            panic!("rewrite");
        };
        assert_eq!(store.current().await, json!({"floors": ["v2"]}));
    }

    #[tokio::test]
    async fn without_reload_file_is_cached() {
        let Ok(file) = tempfile::NamedTempFile::new() else {
            panic!("tempfile");
        };
        let Ok(()) = std::fs::write(file.path(), r#"{"floors":[1]}"#) else {
            panic!("write");
        };
        let cfg = StructureConfig::File {
            path: file.path().to_path_buf(),
            reload: false,
        };
        let Ok(store) = StructureStore::load(&cfg).await else {
            panic!("file structure loads");
        };
        let Ok(()) = std::fs::write(file.path(), r#"{"floors":[2]}"#) else {
            panic!("rewrite");
        };
        assert_eq!(store.current().await, json!({"floors": [1]}));
    }
}
