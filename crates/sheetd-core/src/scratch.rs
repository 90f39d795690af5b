//! A minimal in-tree engine used by the development worker and tests.
//!
//! `ScratchEngine` stands in for a real automation binding: it holds the
//! file's bytes in memory, writes them back on save, and supports only
//! diagnostic commands. Real deployments implement [`WorkbookEngine`]
//! against an actual automation host.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::engine::{EngineDocument, WorkbookEngine};
use crate::error::{Error, Result};

/// Development stand-in engine.
#[derive(Debug, Default)]
pub struct ScratchEngine;

impl WorkbookEngine for ScratchEngine {
    fn open(&self, path: &Path) -> Result<Box<dyn EngineDocument>> {
        let bytes = fs::read(path)
            .map_err(|e| Error::engine(format!("cannot open {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "scratch engine opened workbook");
        Ok(Box::new(ScratchDocument {
            path: path.to_path_buf(),
            bytes,
            dirty: false,
        }))
    }
}

#[derive(Debug)]
struct ScratchDocument {
    path: PathBuf,
    bytes: Vec<u8>,
    dirty: bool,
}

impl EngineDocument for ScratchDocument {
    fn execute(&mut self, command: &str, args: &Value) -> Result<Value> {
        match command {
            "workbook.info" => Ok(json!({
                "path": self.path.display().to_string(),
                "size": self.bytes.len(),
                "dirty": self.dirty,
            })),
            "debug.echo" => Ok(args.clone()),
            "debug.set-content" => {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::engine("debug.set-content requires 'content'"))?;
                self.bytes = content.as_bytes().to_vec();
                self.dirty = true;
                Ok(Value::Null)
            }
            other => Err(Error::engine(format!(
                "scratch engine does not support '{other}'"
            ))),
        }
    }

    fn save(&mut self) -> Result<()> {
        fs::write(&self.path, &self.bytes)
            .map_err(|e| Error::engine(format!("cannot save {}: {e}", self.path.display())))?;
        self.dirty = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
