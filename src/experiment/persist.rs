//! JSON persistence helpers shared by the configuration and artifact caches.

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Atomically write JSON data to a file.
///
/// Serializes to a uniquely named temp file in the destination directory,
/// then renames it over `path`, so readers (and concurrent writers in other
/// processes) never observe a partial file. Creates parent directories.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".hydrofold-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&data)?))
}

/// Removes `path` if present.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Hex SHA-256 of the canonical JSON encoding of `value`.
pub fn digest<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn write_then_read_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        let mut data = BTreeMap::new();
        data.insert("fold".to_string(), 3);

        atomic_write_json(&path, &data).unwrap();
        atomic_write_json(&path, &data).unwrap();

        let back: Option<BTreeMap<String, i32>> = read_json(&path).unwrap();
        assert_eq!(back, Some(data));
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let got: Option<i32> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(got.is_none());
        remove_if_exists(&dir.path().join("absent.json")).unwrap();
    }

    #[test]
    fn digest_is_stable_hex() {
        let a = digest(&("x", 1)).unwrap();
        assert_eq!(a, digest(&("x", 1)).unwrap());
        assert_ne!(a, digest(&("x", 2)).unwrap());
        assert_eq!(a.len(), 64);
    }
}
