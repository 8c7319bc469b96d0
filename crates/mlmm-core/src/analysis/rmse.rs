use super::AnalysisError;

/// Root-mean-square error `sqrt(mean((a - b)²))`.
///
/// # Errors
///
/// Fails if the sequences differ in length or are empty.
pub fn rmse(a: &[f64], b: &[f64]) -> Result<f64, AnalysisError> {
    if a.len() != b.len() {
        return Err(AnalysisError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(AnalysisError::Empty);
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Ok((sum / a.len() as f64).sqrt())
}

/// Reference and model values of the static and induced embedding energies, one entry
/// per sampled configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyComparison {
    static_reference: Vec<f64>,
    static_model: Vec<f64>,
    induced_reference: Vec<f64>,
    induced_model: Vec<f64>,
}

/// RMSE of each energy component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmseReport {
    pub samples: usize,
    pub static_rmse: f64,
    pub induced_rmse: f64,
    pub total_rmse: f64,
}

impl EnergyComparison {
    /// # Errors
    ///
    /// Fails unless all four series are non-empty and equally long.
    pub fn new(
        static_reference: Vec<f64>,
        static_model: Vec<f64>,
        induced_reference: Vec<f64>,
        induced_model: Vec<f64>,
    ) -> Result<Self, AnalysisError> {
        let n = static_reference.len();
        for other in [&static_model, &induced_reference, &induced_model] {
            if other.len() != n {
                return Err(AnalysisError::LengthMismatch {
                    left: n,
                    right: other.len(),
                });
            }
        }
        if n == 0 {
            return Err(AnalysisError::Empty);
        }
        Ok(Self {
            static_reference,
            static_model,
            induced_reference,
            induced_model,
        })
    }

    pub fn len(&self) -> usize {
        self.static_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.static_reference.is_empty()
    }

    /// Multiplies every value by `factor`, e.g. to change energy units.
    pub fn scaled(mut self, factor: f64) -> Self {
        for series in [
            &mut self.static_reference,
            &mut self.static_model,
            &mut self.induced_reference,
            &mut self.induced_model,
        ] {
            series.iter_mut().for_each(|x| *x *= factor);
        }
        self
    }

    pub fn static_rmse(&self) -> Result<f64, AnalysisError> {
        rmse(&self.static_reference, &self.static_model)
    }

    pub fn induced_rmse(&self) -> Result<f64, AnalysisError> {
        rmse(&self.induced_reference, &self.induced_model)
    }

    /// RMSE of the summed static and induced energies.
    ///
    /// Errors in the two components can cancel, so this is not the quadrature sum of
    /// the component RMSEs.
    pub fn total_rmse(&self) -> Result<f64, AnalysisError> {
        let sum = |a: &[f64], b: &[f64]| -> Vec<f64> { a.iter().zip(b).map(|(x, y)| x + y).collect() };
        rmse(
            &sum(&self.static_reference, &self.induced_reference),
            &sum(&self.static_model, &self.induced_model),
        )
    }

    pub fn report(&self) -> Result<RmseReport, AnalysisError> {
        Ok(RmseReport {
            samples: self.len(),
            static_rmse: self.static_rmse()?,
            induced_rmse: self.induced_rmse()?,
            total_rmse: self.total_rmse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn rmse_of_identical_series_is_zero() {
        let a = [1.0, -2.5, 3.25];
        assert_eq!(rmse(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn rmse_is_symmetric() {
        let a = [0.1, 0.4, -0.3, 2.0];
        let b = [0.0, 0.7, -0.1, 1.5];
        assert!((rmse(&a, &b).unwrap() - rmse(&b, &a).unwrap()).abs() < TOLERANCE);
    }

    #[test]
    fn rmse_matches_hand_computation() {
        let value = rmse(&[1.0, 2.0, 3.0, 4.0], &[2.0, 2.0, 1.0, 4.0]).unwrap();
        assert!((value - (5.0f64 / 4.0).sqrt()).abs() < TOLERANCE);
    }

    #[test]
    fn rmse_rejects_length_mismatch_and_empty_input() {
        assert_eq!(
            rmse(&[1.0, 2.0], &[1.0]).unwrap_err(),
            AnalysisError::LengthMismatch { left: 2, right: 1 }
        );
        assert_eq!(rmse(&[], &[]).unwrap_err(), AnalysisError::Empty);
    }

    #[test]
    fn total_rmse_sums_before_taking_the_error() {
        let comparison = EnergyComparison::new(
            vec![1.0, 1.0],
            vec![2.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 2.0],
        )
        .unwrap();
        let report = comparison.report().unwrap();
        assert!((report.static_rmse - 1.0).abs() < TOLERANCE);
        assert!((report.induced_rmse - 1.0).abs() < TOLERANCE);
        assert_eq!(report.total_rmse, 0.0);
        let quadrature = (report.static_rmse.powi(2) + report.induced_rmse.powi(2)).sqrt();
        assert!((report.total_rmse - quadrature).abs() > 1.0);
    }

    #[test]
    fn scaling_scales_every_rmse() {
        let comparison =
            EnergyComparison::new(vec![0.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0], vec![0.5, 0.5])
                .unwrap()
                .scaled(10.0);
        let report = comparison.report().unwrap();
        assert!((report.static_rmse - 10.0).abs() < TOLERANCE);
        assert!((report.induced_rmse - 5.0).abs() < TOLERANCE);
        assert!((report.total_rmse - 15.0).abs() < TOLERANCE);
    }

    #[test]
    fn comparison_requires_equal_lengths() {
        let result = EnergyComparison::new(vec![1.0], vec![1.0], vec![1.0, 2.0], vec![1.0]);
        assert_eq!(
            result.unwrap_err(),
            AnalysisError::LengthMismatch { left: 1, right: 2 }
        );
    }
}
