// CSV/TSV fragment import, unit-table export

use std::io::Read;
use std::path::Path;

use smallarea_core::{JoinKey, KeyNormalization, SourceTable, UnitTable};

/// Load one fragment of a source table.
///
/// The key column is kept as an exact string (after `normalization`); every
/// other column is kept as literal text.
pub fn load_fragment(
    path: &Path,
    key_column: &str,
    normalization: KeyNormalization,
) -> Result<SourceTable, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    log::debug!(
        "{}: delimiter '{}'",
        path.display(),
        delimiter as char
    );
    parse_fragment(&content, delimiter, key_column, normalization, &path.display().to_string())
}

/// Parse fragment text with a known delimiter.
pub fn parse_fragment(
    content: &str,
    delimiter: u8,
    key_column: &str,
    normalization: KeyNormalization,
    source: &str,
) -> Result<SourceTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("{source}: {e}"))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let key_idx = headers
        .iter()
        .position(|h| h == key_column)
        .ok_or_else(|| format!("{source}: missing key column '{key_column}'"))?;

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != key_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut table = SourceTable::new(source, key_column, columns);

    for result in reader.records() {
        let record = result.map_err(|e| format!("{source}: {e}"))?;
        // Blank lines and spreadsheet padding rows like ",,,"
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let key = JoinKey::new(record.get(key_idx).unwrap_or(""), normalization);
        if key.as_str().trim().is_empty() {
            let line = record.position().map_or(0, |p| p.line());
            return Err(format!("{source}: line {line}: empty '{key_column}' value"));
        }
        let values: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_idx)
            .map(|(_, v)| v.to_string())
            .collect();
        table.push_row(key, values);
    }

    Ok(table)
}

/// Read a reference key list: one key per line, blank lines ignored.
pub fn read_key_list(path: &Path, normalization: KeyNormalization) -> Result<Vec<JoinKey>, String> {
    let content = read_file_as_utf8(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| JoinKey::new(line, normalization))
        .collect())
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the first line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // Higher field count breaks ties
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| format!("{}: {e}", path.display()))?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            log::warn!("{}: not valid UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Write the key column plus every indicator column. Nulls become empty cells.
pub fn export_indicators(table: &UnitTable, path: &Path) -> Result<(), String> {
    create_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    write_indicators(table, &mut writer)?;
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

/// Render the indicator table as CSV text.
pub fn indicators_to_string(table: &UnitTable) -> Result<String, String> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    write_indicators(table, &mut writer)?;
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

/// Write the merged source columns (key first). Absent cells become empty.
pub fn export_units(table: &UnitTable, path: &Path) -> Result<(), String> {
    create_parent(path)?;
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .map_err(|e| format!("{}: {e}", path.display()))?;

    let mut header = vec![table.key_column().to_string()];
    header.extend(table.source_columns().iter().cloned());
    writer.write_record(&header).map_err(|e| e.to_string())?;

    for (row, key) in table.keys().iter().enumerate() {
        let mut record = vec![key.as_str().to_string()];
        for col in 0..table.source_columns().len() {
            record.push(table.source_cell(col, row).unwrap_or("").to_string());
        }
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }

    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

fn create_parent(path: &Path) -> Result<(), String> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| format!("{}: {e}", parent.display()))
        }
        _ => Ok(()),
    }
}

fn write_indicators<W: std::io::Write>(table: &UnitTable, writer: &mut csv::Writer<W>) -> Result<(), String> {
    let mut header = vec![table.key_column().to_string()];
    header.extend(table.indicators().iter().map(|c| c.name.clone()));
    writer.write_record(&header).map_err(|e| e.to_string())?;

    for (row, key) in table.keys().iter().enumerate() {
        let mut record = vec![key.as_str().to_string()];
        for column in table.indicators() {
            let cell = match column.values.get(row).copied().flatten() {
                Some(v) => v.to_string(),
                None => String::new(),
            };
            record.push(cell);
        }
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn key_column_survives_as_text() {
        let csv = "zoneid,81sas100929\n0012AB,929\n03BN0001,0\n";
        let t = parse_fragment(csv, b',', "zoneid", KeyNormalization::Exact, "p1").unwrap();
        assert_eq!(t.keys[0].as_str(), "0012AB");
        assert_eq!(t.keys[1].as_str(), "03BN0001");
        assert_eq!(t.columns, vec!["81sas100929"]);
        assert_eq!(t.cell(0, 0), "929");
    }

    #[test]
    fn key_column_not_first() {
        let csv = "a,zoneid,b\n1,K1,2\n";
        let t = parse_fragment(csv, b',', "zoneid", KeyNormalization::Exact, "p1").unwrap();
        assert_eq!(t.columns, vec!["a", "b"]);
        assert_eq!(t.rows[0], vec!["1", "2"]);
    }

    #[test]
    fn missing_key_column_is_error() {
        let csv = "id,a\n1,2\n";
        let err = parse_fragment(csv, b',', "zoneid", KeyNormalization::Exact, "p1").unwrap_err();
        assert!(err.contains("missing key column 'zoneid'"));
    }

    #[test]
    fn empty_key_is_error() {
        let csv = "zoneid,a\nK1,1\n,5\n";
        let err = parse_fragment(csv, b',', "zoneid", KeyNormalization::Exact, "p1").unwrap_err();
        assert_eq!(err, "p1: line 3: empty 'zoneid' value");

        let padded = "zoneid,a\nK1,1\n  ,7\n";
        assert!(parse_fragment(padded, b',', "zoneid", KeyNormalization::Exact, "p1").is_err());
    }

    #[test]
    fn blank_padding_rows_are_skipped() {
        let csv = "zoneid,a,b\nK1,1,2\n,,\n\n";
        let t = parse_fragment(csv, b',', "zoneid", KeyNormalization::Exact, "p1").unwrap();
        assert_eq!(t.keys.len(), 1);
    }

    #[test]
    fn headers_are_trimmed() {
        let csv = " zoneid , a \nK1,5\n";
        let t = parse_fragment(csv, b',', "zoneid", KeyNormalization::Exact, "p1").unwrap();
        assert_eq!(t.columns, vec!["a"]);
    }

    #[test]
    fn sniff_semicolon_and_tab() {
        assert_eq!(sniff_delimiter("zoneid;a;b\nK1;1;2\n"), b';');
        assert_eq!(sniff_delimiter("zoneid\ta\nK1\t1\n"), b'\t');
        assert_eq!(sniff_delimiter("zoneid,a\nK1,1\n"), b',');
    }

    #[test]
    fn load_fragment_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("part1.csv");
        fs::write(&path, "zoneid|x\n 03BN01 |7\n").unwrap();
        let t = load_fragment(&path, "zoneid", KeyNormalization::Trim).unwrap();
        assert_eq!(t.keys[0].as_str(), "03BN01");
        assert_eq!(t.cell(0, 0), "7");
    }

    #[test]
    fn windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // 0xE9 = é in Windows-1252, invalid as standalone UTF-8
        fs::write(&path, b"zoneid,name\nK1,caf\xe9\n").unwrap();
        let t = load_fragment(&path, "zoneid", KeyNormalization::Exact).unwrap();
        assert_eq!(t.cell(0, 0), "café");
    }

    #[test]
    fn read_key_list_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        fs::write(&path, "03BN01\n\n03BN02\n").unwrap();
        let keys = read_key_list(&path, KeyNormalization::Exact).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].as_str(), "03BN02");
    }

    #[test]
    fn indicator_export_writes_nulls_as_empty() {
        let mut t = UnitTable::new("zoneid");
        t.ensure_unit(&JoinKey::from("A"));
        t.ensure_unit(&JoinKey::from("B"));
        t.set_indicator("PCT", vec![Some(21.5), None]);

        let text = indicators_to_string(&t).unwrap();
        assert_eq!(text, "zoneid,PCT\nA,21.5\nB,\n");
    }

    #[test]
    fn unit_export_roundtrips_through_fragment_parser() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("units.csv");
        let mut t = UnitTable::new("zoneid");
        let col = t.add_source_column("pop").unwrap();
        let row = t.ensure_unit(&JoinKey::from("007"));
        t.set_source_cell(col, row, "12".into());

        export_units(&t, &path).unwrap();
        let back = load_fragment(&path, "zoneid", KeyNormalization::Exact).unwrap();
        assert_eq!(back.keys[0].as_str(), "007");
        assert_eq!(back.cell(0, 0), "12");
    }
}
