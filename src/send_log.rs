//! Per-file send receipts written under `log_sent/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

pub const LOG_DIR_NAME: &str = "log_sent";

/// Where the receipt of row `index` goes.
///
/// The name is `{index}-{stem}_{extension}_{hash}.json`, where `hash` is the first
/// five hex digits of the md5 of the source's parent folder, so equally named files
/// from different subfolders do not collide.
pub fn log_file_path(project_dir: &Path, source: &Path, index: usize) -> PathBuf {
    let parent = source
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digest = format!("{:x}", md5::compute(parent.as_bytes()));
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    project_dir
        .join(LOG_DIR_NAME)
        .join(format!("{index}-{stem}_{extension}_{}.json", &digest[..5]))
}

/// Merge the platform acknowledgement with `file_origin`.
///
/// A non-object acknowledgement is kept under `result`.
pub fn send_log_record(ack: Value, source: &Path) -> Value {
    let mut record = match ack {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    record.insert(
        "file_origin".to_string(),
        Value::String(source.to_string_lossy().into_owned()),
    );
    Value::Object(record)
}

/// Write the receipt to `log_path`, creating the log folder if needed.
/// An existing receipt at the same path is overwritten.
pub fn write_send_log(ack: Value, source: &Path, log_path: &Path) -> io::Result<()> {
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let record = send_log_record(ack, source);
    let body = serde_json::to_string_pretty(&record)?;
    fs::write(log_path, body)?;
    debug!(log = %log_path.display(), source = %source.display(), "Wrote send log");
    Ok(())
}
