//! Offsets command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use rigscope::{OffsetTable, save_offsets};

/// Write the built-in offset table as a starting point for a new build
pub fn run(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    let table = OffsetTable::default();
    save_offsets(output, &table)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Offsets {} written to {}", table.version, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigscope::load_offsets;
    use tempfile::tempdir;

    #[test]
    fn test_writes_default_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offsets.json");

        run(&path, false).unwrap();
        assert_eq!(load_offsets(&path).unwrap(), OffsetTable::default());
    }

    #[test]
    fn test_refuses_to_overwrite_without_force() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offsets.json");
        std::fs::write(&path, "{}").unwrap();

        assert!(run(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");

        run(&path, true).unwrap();
        assert!(load_offsets(&path).is_ok());
    }
}
