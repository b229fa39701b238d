// JSON export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

/// Write any report as pretty-printed JSON, creating parent directories.
pub fn write_pretty<T: Serialize>(value: &T, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
    }
    let file = File::create(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value).map_err(|e| e.to_string())?;
    Ok(())
}

pub fn to_pretty_string<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_json_export_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs/nested/report.json");

        let mut report = BTreeMap::new();
        report.insert("unit_count", 1017);
        report.insert("indicator_count", 12);

        write_pretty(&report, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, u32> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["unit_count"], 1017);
        assert_eq!(parsed["indicator_count"], 12);
    }
}
