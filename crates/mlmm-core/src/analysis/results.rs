use super::AnalysisError;
use super::rmse::EnergyComparison;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

pub const STATIC_REFERENCE_KEY: &str = "e_static_qm";
pub const STATIC_MODEL_KEY: &str = "e_static_emle";
pub const INDUCED_REFERENCE_KEY: &str = "e_ind_qm";
pub const INDUCED_MODEL_KEY: &str = "e_ind_emle";

/// Loads a comparison from a MATLAB `.mat` file or a CSV table, chosen by extension.
pub fn load_comparison(path: &Path) -> Result<EnergyComparison, AnalysisError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let comparison = match extension.as_deref() {
        Some("mat") => read_mat(BufReader::new(File::open(path)?))?,
        Some("csv") => read_csv(BufReader::new(File::open(path)?))?,
        _ => {
            return Err(AnalysisError::UnsupportedFormat(path.display().to_string()));
        }
    };
    debug!(
        samples = comparison.len(),
        "Loaded energy comparison from {}",
        path.display()
    );
    Ok(comparison)
}

/// Reads the four energy arrays from a level-5 MAT-file.
pub fn read_mat<R: Read>(reader: R) -> Result<EnergyComparison, AnalysisError> {
    let mat = matfile::MatFile::parse(reader).map_err(|e| AnalysisError::Mat(format!("{e:?}")))?;
    let series = |key: &str| -> Result<Vec<f64>, AnalysisError> {
        let array = mat
            .find_by_name(key)
            .ok_or_else(|| AnalysisError::MissingKey(key.to_string()))?;
        numeric_values(array.data()).ok_or_else(|| AnalysisError::NotNumeric(key.to_string()))
    };
    EnergyComparison::new(
        series(STATIC_REFERENCE_KEY)?,
        series(STATIC_MODEL_KEY)?,
        series(INDUCED_REFERENCE_KEY)?,
        series(INDUCED_MODEL_KEY)?,
    )
}

/// Real parts of a numeric MAT array as `f64`, in storage order.
fn numeric_values(data: &matfile::NumericData) -> Option<Vec<f64>> {
    use matfile::NumericData as N;
    let values = match data {
        N::Double { real, .. } => real.clone(),
        N::Single { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        N::Int8 { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        N::UInt8 { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        N::Int16 { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        N::UInt16 { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        N::Int32 { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        N::UInt32 { real, .. } => real.iter().map(|&x| f64::from(x)).collect(),
        _ => return None,
    };
    Some(values)
}

#[derive(Debug, Deserialize)]
struct Row {
    e_static_qm: f64,
    e_static_emle: f64,
    e_ind_qm: f64,
    e_ind_emle: f64,
}

/// Reads a CSV table with one row per configuration and the four energy columns.
pub fn read_csv<R: Read>(reader: R) -> Result<EnergyComparison, AnalysisError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let (mut sq, mut sm, mut iq, mut im) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for row in csv.deserialize::<Row>() {
        let row = row?;
        sq.push(row.e_static_qm);
        sm.push(row.e_static_emle);
        iq.push(row.e_ind_qm);
        im.push(row.e_ind_emle);
    }
    EnergyComparison::new(sq, sm, iq, im)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_columns_may_come_in_any_order() {
        let text = "\
e_ind_emle, e_ind_qm, e_static_emle, e_static_qm
0.5, 0.0, 1.0, 0.0
0.5, 0.0, 1.0, 0.0
";
        let report = read_csv(text.as_bytes()).unwrap().report().unwrap();
        assert_eq!(report.samples, 2);
        assert!((report.static_rmse - 1.0).abs() < 1e-12);
        assert!((report.induced_rmse - 0.5).abs() < 1e-12);
        assert!((report.total_rmse - 1.5).abs() < 1e-12);
    }

    #[test]
    fn csv_missing_column_is_an_error() {
        let text = "e_static_qm,e_static_emle,e_ind_qm\n1,2,3\n";
        assert!(matches!(read_csv(text.as_bytes()), Err(AnalysisError::Csv(_))));
    }

    #[test]
    fn empty_csv_is_rejected() {
        let text = "e_static_qm,e_static_emle,e_ind_qm,e_ind_emle\n";
        assert_eq!(read_csv(text.as_bytes()).unwrap_err(), AnalysisError::Empty);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let result = load_comparison(Path::new("results.xlsx"));
        assert!(matches!(result, Err(AnalysisError::UnsupportedFormat(_))));
    }

    #[test]
    fn garbage_mat_file_is_rejected() {
        let result = read_mat(&b"definitely not a MAT-file"[..]);
        assert!(matches!(result, Err(AnalysisError::Mat(_))));
    }

    #[test]
    fn load_comparison_reads_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("energies.CSV");
        std::fs::write(
            &path,
            "e_static_qm,e_static_emle,e_ind_qm,e_ind_emle\n1.0,1.5,0.2,0.1\n",
        )
        .unwrap();
        let comparison = load_comparison(&path).unwrap();
        assert_eq!(comparison.len(), 1);
    }
}
