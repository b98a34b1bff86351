//! Tabulated `z → value` conversions, e.g. arcmin-per-Mpc against redshift.
//!
//! The file format is plain text: one `z value` pair per line, whitespace
//! separated, `#` starting a comment. Rows must be sorted by strictly
//! increasing `z`.

use crate::error::{Result, SurveyError};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationTable {
    z: Vec<f64>,
    values: Vec<f64>,
}

impl InterpolationTable {
    pub fn new(z: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if z.is_empty() || z.len() != values.len() {
            return Err(SurveyError::integrity(format!(
                "interpolation table needs matching non-empty columns, got {} z and {} values",
                z.len(),
                values.len()
            )));
        }
        if let Some(w) = z.windows(2).find(|w| !(w[0] < w[1])) {
            return Err(SurveyError::integrity(format!(
                "interpolation z not strictly increasing at {} -> {}",
                w[0], w[1]
            )));
        }
        Ok(Self { z, values })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| SurveyError::io(path, e))?;
        Self::parse(&text).map_err(|message| SurveyError::corrupt(path, message))
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let mut z = Vec::new();
        let mut values = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [zs, vs] = fields[..] else {
                return Err(format!("line {}: expected 2 columns, got {}", lineno + 1, fields.len()));
            };
            let parse = |s: &str| {
                s.parse::<f64>()
                    .map_err(|e| format!("line {}: {s:?}: {e}", lineno + 1))
            };
            z.push(parse(zs)?);
            values.push(parse(vs)?);
        }
        Self::new(z, values).map_err(|e| e.to_string())
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    /// Piecewise-linear value at `z`, clamped to the end values outside the
    /// tabulated range. NaN in, NaN out.
    pub fn interpolate(&self, z: f64) -> f64 {
        if z.is_nan() {
            return f64::NAN;
        }
        let last = self.z.len() - 1;
        if z <= self.z[0] {
            return self.values[0];
        }
        if z >= self.z[last] {
            return self.values[last];
        }
        let hi = self.z.partition_point(|&x| x <= z);
        let lo = hi - 1;
        let t = (z - self.z[lo]) / (self.z[hi] - self.z[lo]);
        self.values[lo] + t * (self.values[hi] - self.values[lo])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_interpolate_linear_and_clamped() {
        let t = InterpolationTable::new(vec![0.1, 0.2, 0.4], vec![10.0, 20.0, 10.0]).unwrap();
        assert_eq!(t.interpolate(0.0), 10.0);
        assert_eq!(t.interpolate(1.0), 10.0);
        assert_eq!(t.interpolate(0.2), 20.0);
        assert!((t.interpolate(0.15) - 15.0).abs() < 1e-12);
        assert!((t.interpolate(0.3) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolate_non_finite() {
        let t = InterpolationTable::new(vec![0.1, 0.4], vec![10.0, 20.0]).unwrap();
        assert!(t.interpolate(f64::NAN).is_nan());
        assert_eq!(t.interpolate(f64::INFINITY), 20.0);
        assert_eq!(t.interpolate(f64::NEG_INFINITY), 10.0);
    }

    #[test]
    fn test_new_rejects_unsorted() {
        assert!(InterpolationTable::new(vec![0.2, 0.1], vec![1.0, 2.0]).is_err());
        assert!(InterpolationTable::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_from_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "# z  arcmin/Mpc\n0.1 9.0\n\n0.3   3.0 # tail\n",
        )
        .unwrap();
        let t = InterpolationTable::from_file(file.path()).unwrap();
        assert_eq!(t.len(), 2);
        assert!((t.interpolate(0.2) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_file_bad_line() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "0.1 9.0 extra\n").unwrap();
        assert!(matches!(
            InterpolationTable::from_file(file.path()),
            Err(SurveyError::CorruptTable { .. })
        ));
    }
}
