use crate::analysis::{AnalysisError, RmseReport, load_comparison};
use std::path::Path;
use tracing::{info, instrument};

/// Loads reference and model embedding energies from `path` and reports their RMSE.
///
/// Values are multiplied by `scale` before comparison, so results stored in Hartree can
/// be reported in kJ/mol or kcal/mol.
#[instrument(skip_all, name = "analysis_workflow", fields(path = %path.display()))]
pub fn run(path: &Path, scale: f64) -> Result<RmseReport, AnalysisError> {
    let comparison = load_comparison(path)?.scaled(scale);
    let report = comparison.report()?;
    info!(
        samples = report.samples,
        static_rmse = report.static_rmse,
        induced_rmse = report.induced_rmse,
        total_rmse = report.total_rmse,
        "Computed embedding energy errors"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_scaled_errors_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(
            &path,
            "e_static_qm,e_static_emle,e_ind_qm,e_ind_emle\n\
             0.010,0.012,0.001,0.001\n\
             0.020,0.018,0.002,0.002\n",
        )
        .unwrap();
        let report = run(&path, 1000.0).unwrap();
        assert_eq!(report.samples, 2);
        assert!((report.static_rmse - 2.0).abs() < 1e-9);
        assert!(report.induced_rmse.abs() < 1e-9);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(&dir.path().join("absent.mat"), 1.0);
        assert!(matches!(result, Err(AnalysisError::Io(_))));
    }
}
