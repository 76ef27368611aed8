//! Atomic JSON persistence (§5, §9): write to a temp file in the same
//! directory, then `rename` over the target so a crash never leaves a
//! torn file. The teacher has no persistence layer of its own; this
//! follows §9's explicit "atomic write-via-rename" design note.

use std::fs;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::PersistError;

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| PersistError::Write(e.to_string()))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("state")
    ));

    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistError::Write(e.to_string()))?;
    fs::write(&tmp_path, bytes).map_err(|e| PersistError::Write(e.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|e| PersistError::Write(e.to_string()))?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, PersistError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = fs::read(path).map_err(|e| PersistError::Read(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| PersistError::Read(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default, PartialEq, Debug)]
    struct Sample {
        n: i64,
    }

    #[test]
    fn round_trips_through_atomic_write() {
        let dir = std::env::temp_dir().join(format!("odds_arb_test_{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.json");
        write_json_atomic(&path, &Sample { n: 7 }).unwrap();
        let loaded: Sample = read_json(&path).unwrap();
        assert_eq!(loaded, Sample { n: 7 });
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_yields_default() {
        let path = std::env::temp_dir().join(format!("odds_arb_missing_{}.json", uuid::Uuid::new_v4()));
        let loaded: Sample = read_json(&path).unwrap();
        assert_eq!(loaded, Sample::default());
    }
}
