//! JSONL storage: one composition per line.
//!
//! Blank lines and `#` comments are ignored on read. Writes go to a sibling
//! temp file which is synced and then renamed over the target, so readers
//! see either the old or the new file, never a torn one.

use crate::composition::Composition;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: invalid composition: {message}")]
    Parse { line: usize, message: String },

    #[error("composition {id}: failed to encode: {message}")]
    Encode { id: String, message: String },

    #[error("{path}: corrupted store: {reason}")]
    Corrupt { path: String, reason: &'static str },
}

impl JsonlError {
    fn io(path: &Path, source: io::Error) -> Self {
        JsonlError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Parse every composition line from `reader`.
pub fn read_compositions(reader: impl BufRead) -> Result<Vec<Composition>, JsonlError> {
    let mut compositions = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| JsonlError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        let body = line.trim();
        if body.is_empty() || body.starts_with('#') {
            continue;
        }
        let composition = serde_json::from_str(body).map_err(|e| JsonlError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        compositions.push(composition);
    }
    Ok(compositions)
}

/// Serialize `compositions` one per line.
pub fn write_compositions(
    writer: &mut impl Write,
    compositions: &[Composition],
) -> io::Result<()> {
    for composition in compositions {
        serde_json::to_writer(&mut *writer, composition).map_err(io::Error::other)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn read_compositions_from_path(
    path: impl AsRef<Path>,
) -> Result<Vec<Composition>, JsonlError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| JsonlError::io(path, e))?;
    check_text(path, &bytes)?;
    read_compositions(bytes.as_slice())
}

/// Replace the file at `path` with `compositions`.
pub fn write_compositions_to_path(
    path: impl AsRef<Path>,
    compositions: &[Composition],
) -> Result<(), JsonlError> {
    let path = path.as_ref();
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        fs::create_dir_all(dir).map_err(|e| JsonlError::io(dir, e))?;
    }

    // Encode up front so a bad record never leaves a temp file behind.
    let mut encoded = Vec::with_capacity(compositions.len() * 256);
    for composition in compositions {
        serde_json::to_writer(&mut encoded, composition).map_err(|e| JsonlError::Encode {
            id: composition.id.clone(),
            message: e.to_string(),
        })?;
        encoded.push(b'\n');
    }

    let staged = StagedFile::create(path)?;
    staged.commit(&encoded)?;

    if let Some(dir) = parent {
        File::open(dir)
            .and_then(|handle| handle.sync_all())
            .map_err(|e| JsonlError::io(dir, e))?;
    }
    Ok(())
}

fn check_text(path: &Path, bytes: &[u8]) -> Result<(), JsonlError> {
    let reason = if bytes.contains(&0) {
        "contains NUL bytes"
    } else if std::str::from_utf8(bytes).is_err() {
        "not valid UTF-8"
    } else {
        return Ok(());
    };
    Err(JsonlError::Corrupt {
        path: path.display().to_string(),
        reason,
    })
}

static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Temp file next to the target. Removed on drop unless renamed into place.
struct StagedFile {
    target: PathBuf,
    temp: PathBuf,
    file: Option<File>,
}

impl StagedFile {
    fn create(target: &Path) -> Result<Self, JsonlError> {
        let mut temp: OsString = target.as_os_str().to_os_string();
        temp.push(format!(
            ".tmp.{}.{}",
            std::process::id(),
            STAGE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let temp = PathBuf::from(temp);
        let file = File::create(&temp).map_err(|e| JsonlError::io(&temp, e))?;
        Ok(Self {
            target: target.to_path_buf(),
            temp,
            file: Some(file),
        })
    }

    fn commit(mut self, bytes: &[u8]) -> Result<(), JsonlError> {
        if let Some(file) = self.file.take() {
            let mut writer = BufWriter::new(file);
            writer
                .write_all(bytes)
                .and_then(|_| writer.flush())
                .map_err(|e| JsonlError::io(&self.temp, e))?;
            writer
                .into_inner()
                .map_err(|e| JsonlError::io(&self.temp, e.into_error()))?
                .sync_all()
                .map_err(|e| JsonlError::io(&self.temp, e))?;
        }
        fs::rename(&self.temp, &self.target).map_err(|e| JsonlError::io(&self.target, e))?;
        self.temp = PathBuf::new();
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.temp.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costgraph_units::Quantity;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "costgraph-jsonl-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    fn kg_item(id: &str) -> Composition {
        Composition::new(id, Quantity::new(1.0, "kg"), Quantity::new(0.0, "kg"))
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let raw = "# bakery\n\n{\"id\":\"c-1\",\"unit\":{\"value\":1,\"unit\":\"kg\"}}\n   \n";
        let compositions = read_compositions(raw.as_bytes()).expect("jsonl should parse");
        assert_eq!(compositions.len(), 1);
        assert_eq!(compositions[0].id, "c-1");
        assert!(compositions[0].autoupdate_cost);
    }

    #[test]
    fn parse_error_names_the_line() {
        let raw = "{\"id\":\"c-1\",\"unit\":{\"value\":1,\"unit\":\"kg\"}}\n{\"id\":\"c-2\"}\n";
        let err = read_compositions(raw.as_bytes()).expect_err("missing unit");
        assert!(matches!(err, JsonlError::Parse { line: 2, .. }));
    }

    #[test]
    fn binary_garbage_is_reported_as_corruption() {
        let dir = scratch_dir("corrupt");
        let path = dir.join("compositions.jsonl");
        fs::write(&path, b"{\"id\":\"c-1\"}\n\0\0").expect("fixture");

        let err = read_compositions_from_path(&path).expect_err("NUL bytes");
        assert!(matches!(err, JsonlError::Corrupt { reason, .. } if reason.contains("NUL")));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn rewrite_replaces_content_and_leaves_no_temp_files() {
        let dir = scratch_dir("rewrite");
        let path = dir.join("nested").join("compositions.jsonl");

        write_compositions_to_path(&path, &[kg_item("c-1"), kg_item("c-2")]).expect("first");
        write_compositions_to_path(&path, &[kg_item("c-3")]).expect("second");

        let back = read_compositions_from_path(&path).expect("read back");
        let ids: Vec<&str> = back.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c-3"]);

        let leftovers = fs::read_dir(path.parent().expect("parent"))
            .expect("list dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = scratch_dir("missing");
        let err = read_compositions_from_path(dir.join("absent.jsonl")).expect_err("absent");
        assert!(matches!(err, JsonlError::Io { .. }));
        let _ = fs::remove_dir_all(dir);
    }
}
