//! JSON Lines archives keyed by utterance.
//!
//! Each line is `{"key": "<utt>", "value": <payload>}`. Vectors are
//! `[f64]`, matrices are row-major `[[f64]]`. The path `-` means stdin for
//! readers and stdout for writers.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use anyhow::{bail, Context};
use nalgebra::{DMatrix, DVector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const STDIO: &str = "-";

#[derive(Debug, Serialize, Deserialize)]
struct Entry<T> {
    key: String,
    value: T,
}

#[derive(Serialize)]
struct EntryRef<'a, T> {
    key: &'a str,
    value: &'a T,
}

/// Sequential reader over an archive.
pub struct ArchiveReader<T> {
    name: String,
    lines: io::Lines<Box<dyn BufRead>>,
    line_no: usize,
    _payload: PhantomData<T>,
}

impl<T: DeserializeOwned> ArchiveReader<T> {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let input: Box<dyn BufRead> = if path == STDIO {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = File::open(path).with_context(|| format!("open archive {path}"))?;
            Box::new(BufReader::new(file))
        };
        Ok(Self {
            name: path.to_string(),
            lines: input.lines(),
            line_no: 0,
            _payload: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for ArchiveReader<T> {
    type Item = anyhow::Result<(String, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e).with_context(|| format!("read {}", self.name))),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<Entry<T>>(&line)
                .map(|e| (e.key, e.value))
                .with_context(|| format!("{}:{}: malformed entry", self.name, self.line_no));
            return Some(parsed);
        }
    }
}

/// Reads a whole matrix archive into a key map for random access.
pub fn read_matrix_map(path: &str) -> anyhow::Result<HashMap<String, DMatrix<f64>>> {
    let mut map = HashMap::new();
    for entry in ArchiveReader::<Vec<Vec<f64>>>::open(path)? {
        let (key, rows) = entry?;
        let m = matrix_from_rows(&rows).with_context(|| format!("{path}: entry {key}"))?;
        map.insert(key, m);
    }
    Ok(map)
}

/// Reads an `utt2spk` file: one `<utterance> <speaker>` pair per line.
pub fn read_utt2spk(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut map = HashMap::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        let mut fields = line.split_whitespace();
        let (Some(utt), Some(spk)) = (fields.next(), fields.next()) else {
            if line.trim().is_empty() {
                continue;
            }
            bail!("{}:{}: expected '<utterance> <speaker>'", path.display(), i + 1);
        };
        map.insert(utt.to_string(), spk.to_string());
    }
    Ok(map)
}

/// Buffered archive writer.
pub struct ArchiveWriter {
    name: String,
    out: Box<dyn Write>,
}

impl ArchiveWriter {
    pub fn create(path: &str) -> anyhow::Result<Self> {
        let out: Box<dyn Write> = if path == STDIO {
            Box::new(BufWriter::new(io::stdout()))
        } else {
            let file = File::create(path).with_context(|| format!("create archive {path}"))?;
            Box::new(BufWriter::new(file))
        };
        Ok(Self {
            name: path.to_string(),
            out,
        })
    }

    pub fn write<T: Serialize>(&mut self, key: &str, value: &T) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.out, &EntryRef { key, value })
            .with_context(|| format!("write {}", self.name))?;
        self.out
            .write_all(b"\n")
            .with_context(|| format!("write {}", self.name))
    }

    pub fn write_vector(&mut self, key: &str, v: &DVector<f64>) -> anyhow::Result<()> {
        self.write(key, &v.as_slice())
    }

    pub fn write_matrix(&mut self, key: &str, m: &DMatrix<f64>) -> anyhow::Result<()> {
        self.write(key, &matrix_to_rows(m))
    }

    pub fn finish(mut self) -> anyhow::Result<()> {
        self.out
            .flush()
            .with_context(|| format!("flush {}", self.name))
    }
}

/// Builds a matrix from rows of equal length.
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> anyhow::Result<DMatrix<f64>> {
    let cols = rows.first().map_or(0, Vec::len);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != cols) {
        bail!("row {i} has {} columns, expected {cols}", row.len());
    }
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        cols,
        rows.iter().flatten().copied(),
    ))
}

pub fn matrix_to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_rows_round_trip() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let m = matrix_from_rows(&rows).unwrap();
        assert_eq!(m.shape(), (2, 3));
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(matrix_to_rows(&m), rows);

        assert!(matrix_from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
        assert_eq!(matrix_from_rows(&[]).unwrap().shape(), (0, 0));
    }

    #[test]
    fn write_then_read_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feats.jsonl");
        let path = path.to_str().unwrap();

        let mut w = ArchiveWriter::create(path).unwrap();
        w.write_matrix("utt1", &DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        w.write_vector("utt2", &DVector::from_vec(vec![0.5, -0.5]))
            .unwrap();
        w.finish().unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().next().unwrap(), r#"{"key":"utt1","value":[[1.0,2.0],[3.0,4.0]]}"#);

        let mut reader = ArchiveReader::<serde_json::Value>::open(path).unwrap();
        let (key, _) = reader.next().unwrap().unwrap();
        assert_eq!(key, "utt1");
        let (key, value) = reader.next().unwrap().unwrap();
        assert_eq!(key, "utt2");
        assert_eq!(value, serde_json::json!([0.5, -0.5]));
        assert!(reader.next().is_none());
    }

    #[test]
    fn malformed_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "\n{\"key\":\"a\",\"value\":[1.0]}\nnot json\n").unwrap();
        let entries: Vec<_> = ArchiveReader::<Vec<f64>>::open(path.to_str().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_ok());
        let err = entries[1].as_ref().unwrap_err().to_string();
        assert!(err.contains(":3:"), "{err}");
    }

    #[test]
    fn utt2spk_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utt2spk");
        std::fs::write(&path, "utt1 spkA\nutt2 spkA\n\nutt3 spkB\n").unwrap();
        let map = read_utt2spk(&path).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["utt2"], "spkA");

        std::fs::write(&path, "utt1\n").unwrap();
        assert!(read_utt2spk(&path).is_err());
    }
}
