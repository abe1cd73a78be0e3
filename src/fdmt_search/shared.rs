use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One processed window, as written to `candidates.csv`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChunkRecord {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) peak: f64,
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) dm: f64,
    pub(crate) time_s: f64,
    pub(crate) triggered: bool,
}

pub(crate) fn output_stem(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("fdmt")
        .to_string()
}

pub(crate) fn prepare_output_directory(input: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    let output_dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => {
            let parent = input.parent().unwrap_or_else(|| Path::new(""));
            parent.join("fdmt").join(output_stem(input))
        }
    };
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    Ok(output_dir)
}

/// Per-window artefact name, `<stem>_<start>.<ext>` with a zero-padded start.
pub(crate) fn window_file_name(stem: &str, start: usize, ext: &str) -> String {
    format!("{stem}_{start:010}.{ext}")
}

pub(crate) fn write_candidates_csv(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("failed to write {:?}", path))?;
    let mut file = BufWriter::new(file);
    writeln!(
        file,
        "# generated {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )?;
    writeln!(file, "start,end,peak_sigma,dm_row,col,dm,time_s,triggered")?;
    for r in records {
        let flag = if r.triggered { 1 } else { 0 };
        writeln!(
            file,
            "{},{},{:.6},{},{},{:.4},{:.6},{flag}",
            r.start, r.end, r.peak, r.row, r.col, r.dm, r.time_s
        )?;
    }
    file.flush()
        .with_context(|| format!("failed to finalize {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_directory_sits_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("burst_scan.npy");
        let out = prepare_output_directory(&input, None).unwrap();
        assert_eq!(out, dir.path().join("fdmt").join("burst_scan"));
        assert!(out.is_dir());
    }

    #[test]
    fn csv_has_header_and_one_line_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.csv");
        let records = vec![
            ChunkRecord {
                start: 0,
                end: 4096,
                peak: 3.2,
                row: 10,
                col: 100,
                dm: 12.5,
                time_s: 0.25,
                triggered: false,
            },
            ChunkRecord {
                start: 3072,
                end: 7168,
                peak: 9.75,
                row: 200,
                col: 12,
                dm: 331.0,
                time_s: 3.5,
                triggered: true,
            },
        ];
        write_candidates_csv(&path, &records).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("# generated "));
        assert_eq!(lines[1], "start,end,peak_sigma,dm_row,col,dm,time_s,triggered");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].ends_with(",1"));
        assert!(lines[3].starts_with("3072,7168,9.750000,200,12,331.0000"));
    }

    #[test]
    fn window_names_are_zero_padded() {
        assert_eq!(window_file_name("scan", 8192, "npy"), "scan_0000008192.npy");
        assert_eq!(window_file_name("scan", 0, "png"), "scan_0000000000.png");
    }
}
