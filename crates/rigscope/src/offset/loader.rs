use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::OffsetTable;
use crate::error::Result;

/// Load an offset table from a JSON file
pub fn load_offsets<P: AsRef<Path>>(path: P) -> Result<OffsetTable> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let table: OffsetTable = serde_json::from_str(&content)?;

    debug!("Loaded offsets {} from {}", table.version, path.display());
    if !table.is_valid() {
        warn!(
            "Offset table {:?} from {} is incomplete",
            table.version,
            path.display()
        );
    }

    Ok(table)
}

/// Save an offset table as pretty-printed JSON
pub fn save_offsets<P: AsRef<Path>>(path: P, table: &OffsetTable) -> Result<()> {
    let content = serde_json::to_string_pretty(table)?;
    fs::write(&path, content)?;
    info!("Saved offsets to {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offsets.json");

        let mut table = OffsetTable::default();
        table.version = "version-custom".to_string();
        table.string.max_length = 1048;
        save_offsets(&path, &table).unwrap();

        assert_eq!(load_offsets(&path).unwrap(), table);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_offsets(dir.path().join("nope.json")).unwrap_err();
        assert!(err.is_not_found());
    }
}
