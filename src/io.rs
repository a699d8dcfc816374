//! Safetensors archives for reference detections and raw trial signals.
//!
//! Container layout (same as every other array file in this crate):
//!
//! ```text
//! [u64 LE header length N][N bytes JSON header][tensor bytes …]
//! header: { "<key>": { "dtype": "F64", "shape": [..], "data_offsets": [s, e] }, … }
//! ```
//!
//! Reference archive keys, per trial `i` (1-D, one value per event; a trial
//! without events has shape `[0]`):
//!
//! ```text
//! event_times_{i}  max_freq_{i}  low_freq_{i}  high_freq_{i}
//! onset_{i}        offset_{i}    power_{i}     n_trials [1] I32
//! ```
//!
//! Raw-signal archive: one `[n_times, n_trials]` matrix under a configured key.
use ndarray::Array2;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::event::{Attribute, EventSet};

// ── Reader ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct TensorEntry {
    dtype: String,
    shape: Vec<usize>,
    start: usize,
    end: usize,
}

/// A safetensors file read fully into memory.
///
/// The file handle is closed as soon as [`Archive::open`] returns.
#[derive(Debug)]
pub struct Archive {
    path: std::path::PathBuf,
    bytes: Vec<u8>,
    data_start: usize,
    entries: HashMap<String, TensorEntry>,
}

impl Archive {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| HarnessError::archive(path, e.to_string()))?;
        Self::from_bytes(path, bytes)
    }

    fn from_bytes(path: &Path, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(HarnessError::archive(path, "file too small for a safetensors header"));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        let data_start = 8usize
            .checked_add(n)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| HarnessError::archive(path, format!("header length {n} exceeds file")))?;

        let header: HashMap<String, serde_json::Value> = serde_json::from_slice(&bytes[8..data_start])
            .map_err(|e| HarnessError::archive(path, format!("bad header: {e}")))?;

        let mut entries = HashMap::new();
        for (key, val) in header {
            if key == "__metadata__" {
                continue;
            }
            let entry = parse_entry(&val)
                .ok_or_else(|| HarnessError::archive(path, format!("malformed entry '{key}'")))?;
            let in_bounds = entry.start <= entry.end
                && data_start.checked_add(entry.end).is_some_and(|end| end <= bytes.len());
            if !in_bounds {
                return Err(HarnessError::archive(path, format!("'{key}' data out of bounds")));
            }
            entries.insert(key, entry);
        }

        Ok(Self { path: path.to_path_buf(), bytes, data_start, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn shape(&self, key: &str) -> Option<&[usize]> {
        self.entries.get(key).map(|e| e.shape.as_slice())
    }

    /// Tensor `key` converted to `f64`, with its shape.
    /// Handles F32, F64, I32, I64 and U8.
    pub fn read_f64(&self, key: &str) -> Result<(Vec<f64>, Vec<usize>)> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| HarnessError::archive(&self.path, format!("missing '{key}' key")))?;
        let raw = &self.bytes[self.data_start + entry.start..self.data_start + entry.end];

        let vals: Vec<f64> = match entry.dtype.as_str() {
            "F32" => raw.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "F64" => raw.chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            "I32" => raw.chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "I64" => raw.chunks_exact(8)
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
                .collect(),
            "U8" => raw.iter().map(|&b| b as f64).collect(),
            other => {
                return Err(HarnessError::archive(
                    &self.path,
                    format!("'{key}': unsupported dtype {other}"),
                ))
            }
        };

        let expected = entry.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if expected != Some(vals.len()) {
            return Err(HarnessError::archive(
                &self.path,
                format!("'{key}': {} values for shape {:?}", vals.len(), entry.shape),
            ));
        }
        Ok((vals, entry.shape.clone()))
    }

    /// 2-D tensor `key` as an `Array2<f64>`.
    pub fn read_array2(&self, key: &str) -> Result<Array2<f64>> {
        let (vals, shape) = self.read_f64(key)?;
        if shape.len() != 2 {
            return Err(HarnessError::archive(
                &self.path,
                format!("'{key}': expected 2-D tensor, got shape {shape:?}"),
            ));
        }
        Array2::from_shape_vec((shape[0], shape[1]), vals)
            .map_err(|e| HarnessError::archive(&self.path, format!("'{key}': {e}")))
    }

    /// Number of trials stored in a reference archive: the `n_trials` scalar
    /// if present, otherwise the count of `event_times_{i}` keys.
    ///
    /// A stored `n_trials` must be a non-negative integer no larger than the
    /// number of `event_times_{i}` keys.
    fn n_reference_trials(&self) -> Result<usize> {
        let prefix = format!("{}_", Attribute::PeakTime.archive_key());
        let n_keys = self
            .keys()
            .filter(|k| k.strip_prefix(&prefix).is_some_and(|i| i.parse::<usize>().is_ok()))
            .count();
        if !self.contains("n_trials") {
            return Ok(n_keys);
        }

        let (v, _) = self.read_f64("n_trials")?;
        let n = *v
            .first()
            .ok_or_else(|| HarnessError::archive(&self.path, "empty 'n_trials'"))?;
        if !n.is_finite() || n < 0.0 || n.fract() != 0.0 || n > n_keys as f64 {
            return Err(HarnessError::archive(
                &self.path,
                format!("'n_trials' = {n} but archive holds {n_keys} '{prefix}*' tensors"),
            ));
        }
        Ok(n as usize)
    }
}

fn parse_entry(val: &serde_json::Value) -> Option<TensorEntry> {
    let dtype = val.get("dtype")?.as_str()?.to_string();
    let shape = val
        .get("shape")?
        .as_array()?
        .iter()
        .map(|v| v.as_u64().map(|n| n as usize))
        .collect::<Option<Vec<_>>>()?;
    let offsets = val.get("data_offsets")?.as_array()?;
    let start = offsets.first()?.as_u64()? as usize;
    let end = offsets.get(1)?.as_u64()? as usize;
    Some(TensorEntry { dtype, shape, start, end })
}

/// Read a reference archive into an [`EventSet`].
pub fn load_reference(path: &Path) -> Result<EventSet> {
    let archive = Archive::open(path)?;
    let n_trials = archive.n_reference_trials()?;

    let mut columns: [Vec<Vec<f64>>; 7] = Default::default();
    for (attr, col) in Attribute::ALL.iter().zip(columns.iter_mut()) {
        col.reserve(n_trials);
        for i in 0..n_trials {
            let (vals, _) = archive.read_f64(&format!("{}_{i}", attr.archive_key()))?;
            col.push(vals);
        }
    }

    let set = EventSet::from_columns(&columns)
        .map_err(|e| HarnessError::archive(path, e.to_string()))?;
    debug!(path = %path.display(), trials = set.n_trials(), events = set.total_events(),
           "loaded reference archive");
    Ok(set)
}

/// Read the `[n_times, n_trials]` raw trial matrix stored under `key`.
pub fn load_raw_signal(path: &Path, key: &str) -> Result<Array2<f64>> {
    let data = Archive::open(path)?.read_array2(key)?;
    debug!(path = %path.display(), n_times = data.nrows(), n_trials = data.ncols(),
           "loaded raw signal");
    Ok(data)
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// One tensor queued in a [`StWriter`].
struct PendingTensor {
    name: String,
    dtype: &'static str,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

/// Safetensors writer for the F64 and I32 tensors this crate stores.
///
/// ```rust,no_run
/// use specev::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("event_times_0", &[0.12, 0.48], &[2]);
/// w.add_i32("n_trials", &[1], &[1]);
/// w.write(Path::new("/tmp/ref.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    tensors: Vec<PendingTensor>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, "F64", shape, bytes);
    }

    /// Row-major `[rows, cols]` f64 tensor.
    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, "I32", shape, bytes);
    }

    fn push(&mut self, name: &str, dtype: &'static str, shape: &[usize], bytes: Vec<u8>) {
        self.tensors.push(PendingTensor {
            name: name.to_string(),
            dtype,
            shape: shape.to_vec(),
            bytes,
        });
    }

    /// Serialized file contents: length prefix, space-padded JSON header, data.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut header = serde_json::Map::new();
        let mut offset = 0usize;
        for t in &self.tensors {
            let end = offset + t.bytes.len();
            header.insert(
                t.name.clone(),
                serde_json::json!({ "dtype": t.dtype, "shape": t.shape, "data_offsets": [offset, end] }),
            );
            offset = end;
        }

        let mut header = serde_json::to_vec(&header)?;
        header.resize(header.len().next_multiple_of(8), b' ');

        let mut out = Vec::with_capacity(8 + header.len() + offset);
        out.extend_from_slice(&(header.len() as u64).to_le_bytes());
        out.extend_from_slice(&header);
        for t in &self.tensors {
            out.extend_from_slice(&t.bytes);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes().map_err(|e| HarnessError::archive(path, e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| HarnessError::archive(path, e.to_string()))
    }
}

/// Write `set` in the reference archive layout.
pub fn write_reference_archive(set: &EventSet, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    for (i, trial) in set.trials().iter().enumerate() {
        for attr in Attribute::ALL {
            let vals: Vec<f64> = trial.iter().map(|ev| attr.get(ev)).collect();
            w.add_f64(&format!("{}_{i}", attr.archive_key()), &vals, &[vals.len()]);
        }
    }
    w.add_i32("n_trials", &[set.n_trials() as i32], &[1]);
    w.write(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn ev(t: f64) -> Event {
        Event { peak_time: t, peak_freq: 21.0, low_freq: 18.0, high_freq: 25.0,
                onset: t - 0.03, offset: t + 0.03, peak_power: 6.5 }
    }

    #[test]
    fn reference_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.safetensors");
        let set = EventSet::from_trials(vec![vec![ev(0.2), ev(0.1)], vec![], vec![ev(0.9)]]);
        write_reference_archive(&set, &path).unwrap();
        let back = load_reference(&path).unwrap();
        // Order within a trial is preserved exactly.
        assert_eq!(back, set);
    }

    #[test]
    fn trial_count_inferred_without_scalar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.safetensors");
        let mut w = StWriter::new();
        for i in 0..2 {
            for attr in Attribute::ALL {
                w.add_f64(&format!("{}_{i}", attr.archive_key()), &[0.5], &[1]);
            }
        }
        w.write(&path).unwrap();
        let set = load_reference(&path).unwrap();
        assert_eq!(set.event_counts(), vec![1, 1]);
        assert_eq!(set.trial(1).unwrap()[0].peak_power, 0.5);
    }

    #[test]
    fn missing_attribute_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.safetensors");
        let mut w = StWriter::new();
        w.add_f64("event_times_0", &[0.1], &[1]);
        w.add_i32("n_trials", &[1], &[1]);
        w.write(&path).unwrap();
        let err = load_reference(&path).unwrap_err();
        assert!(matches!(err, HarnessError::Archive { .. }), "{err}");
        assert!(err.to_string().contains("max_freq_0"), "{err}");
    }

    #[test]
    fn raw_signal_matrix_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.safetensors");
        let data = Array2::from_shape_fn((600, 3), |(t, k)| (t + 1000 * k) as f64);
        let mut w = StWriter::new();
        w.add_f64_arr2("prestim_raw_yes_no", &data);
        w.write(&path).unwrap();
        let back = load_raw_signal(&path, "prestim_raw_yes_no").unwrap();
        assert_eq!(back.dim(), (600, 3));
        assert_eq!(back[[599, 2]], 2599.0);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.safetensors");
        std::fs::write(&path, [255u8, 0, 0, 0, 0, 0, 0, 0, b'{']).unwrap();
        assert!(matches!(Archive::open(&path), Err(HarnessError::Archive { .. })));
    }

    /// Raw container bytes with `header` as the JSON header and `data` after it.
    fn container(header: &str, data: &[u8]) -> Vec<u8> {
        let mut out = (header.len() as u64).to_le_bytes().to_vec();
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn overflowing_data_offsets_are_rejected() {
        let bytes = container(
            r#"{"x":{"dtype":"F64","shape":[1],"data_offsets":[0,18446744073709551615]}}"#,
            &[0u8; 8],
        );
        let err = Archive::from_bytes(Path::new("x.safetensors"), bytes).unwrap_err();
        assert!(matches!(err, HarnessError::Archive { .. }), "{err}");
        assert!(err.to_string().contains("out of bounds"), "{err}");
    }

    #[test]
    fn offsets_past_end_of_file_are_rejected() {
        let bytes = container(r#"{"x":{"dtype":"F64","shape":[2],"data_offsets":[0,16]}}"#, &[0u8; 8]);
        assert!(matches!(
            Archive::from_bytes(Path::new("x.safetensors"), bytes),
            Err(HarnessError::Archive { .. })
        ));
    }

    #[test]
    fn byte_length_must_match_shape() {
        let bytes = container(r#"{"x":{"dtype":"F64","shape":[3],"data_offsets":[0,16]}}"#, &[0u8; 16]);
        let archive = Archive::from_bytes(Path::new("x.safetensors"), bytes).unwrap();
        let err = archive.read_f64("x").unwrap_err();
        assert!(err.to_string().contains("2 values for shape [3]"), "{err}");

        let huge = container(
            r#"{"x":{"dtype":"U8","shape":[4294967296,4294967296,4294967296],"data_offsets":[0,0]}}"#,
            &[],
        );
        let archive = Archive::from_bytes(Path::new("x.safetensors"), huge).unwrap();
        assert!(matches!(archive.read_f64("x"), Err(HarnessError::Archive { .. })));
    }

    #[test]
    fn absurd_trial_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for n_trials in [1e300, -1.0, 0.5, 2.0, f64::NAN] {
            let path = dir.path().join("ref.safetensors");
            let mut w = StWriter::new();
            for attr in Attribute::ALL {
                w.add_f64(&format!("{}_0", attr.archive_key()), &[0.5], &[1]);
            }
            w.add_f64("n_trials", &[n_trials], &[1]);
            w.write(&path).unwrap();
            match load_reference(&path) {
                Err(HarnessError::Archive { reason, .. }) => {
                    assert!(reason.contains("n_trials"), "n_trials={n_trials}: {reason}");
                }
                other => panic!("n_trials={n_trials}: expected archive error, got {other:?}"),
            }
        }
    }

    #[test]
    fn writer_pads_header_to_eight_bytes() {
        let mut w = StWriter::new();
        w.add_i32("n_trials", &[3], &[1]);
        let bytes = w.to_bytes().unwrap();
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        assert_eq!(n % 8, 0);
        assert_eq!(bytes.len(), 8 + n + 4);
        let archive = Archive::from_bytes(Path::new("mem"), bytes).unwrap();
        assert_eq!(archive.read_f64("n_trials").unwrap(), (vec![3.0], vec![1]));
    }

    #[test]
    fn missing_file_is_archive_error() {
        let err = Archive::open(Path::new("/nonexistent/ref.safetensors")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ref.safetensors"), "{err}");
    }
}
