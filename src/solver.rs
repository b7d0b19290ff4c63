use nalgebra::{ComplexField, DMatrix, DVector};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{Result, SimError, SolveLocation};

/// Scalar types the MNA system can be assembled over: `f64` for transient
/// steps, `Complex<f64>` for phasor solves.
pub trait MnaScalar: ComplexField<RealField = f64> + Copy {}

impl MnaScalar for f64 {}
impl MnaScalar for Complex<f64> {}

/// Solver configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Residual norm (relative to the RHS norm) above which a solve is flagged.
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: SolverMethod::Lu,
            tolerance: 1e-9,
        }
    }
}

/// Available solver methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Direct LU decomposition with partial pivoting
    Lu,
    /// QR decomposition
    Qr,
}

/// Solver statistics
#[derive(Debug, Clone)]
pub struct SolverStats {
    pub method_used: SolverMethod,
    pub residual_norm: f64,
    pub solve_time: f64,
    pub success: bool,
}

/// Dense direct solver
#[derive(Debug, Clone, Default)]
pub struct LinearSolver {
    config: SolverConfig,
}

impl LinearSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        LinearSolver {
            config: SolverConfig::default(),
        }
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        LinearSolver { config }
    }

    /// Solve the linear system Ax = b
    pub fn solve_dense<T: MnaScalar>(
        &self,
        matrix: &DMatrix<T>,
        rhs: &DVector<T>,
    ) -> Result<(DVector<T>, SolverStats)> {
        let start_time = Instant::now();

        if matrix.nrows() != matrix.ncols() {
            return Err(SimError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: matrix.ncols(),
            });
        }
        if matrix.nrows() != rhs.len() {
            return Err(SimError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: rhs.len(),
            });
        }

        let solution = match self.config.method {
            SolverMethod::Lu => matrix.clone().lu().solve(rhs),
            SolverMethod::Qr => matrix.clone().qr().solve(rhs),
        };

        let singular = || SimError::SingularSystem {
            location: SolveLocation::Unspecified,
        };
        let solution = solution.ok_or_else(singular)?;
        if solution.iter().any(|x| !x.is_finite()) {
            return Err(singular());
        }

        let residual_norm = (matrix * &solution - rhs).norm();
        let scale = rhs.norm().max(1.0);

        Ok((
            solution,
            SolverStats {
                method_used: self.config.method,
                residual_norm,
                solve_time: start_time.elapsed().as_secs_f64(),
                success: residual_norm <= self.config.tolerance * scale,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_lu_solver() {
        let solver = LinearSolver::new();

        // Create a simple 2x2 system: [2 1; 1 2] * [x; y] = [3; 3]
        // Solution should be [1; 1]
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let rhs = DVector::from_vec(vec![3.0, 3.0]);

        let (solution, stats) = solver.solve_dense(&matrix, &rhs).unwrap();

        assert!((solution[0] - 1.0).abs() < 1e-10);
        assert!((solution[1] - 1.0).abs() < 1e-10);
        assert!(stats.success);
        assert_eq!(stats.method_used, SolverMethod::Lu);
    }

    #[test]
    fn test_dense_qr_solver() {
        let solver = LinearSolver::with_config(SolverConfig {
            method: SolverMethod::Qr,
            ..SolverConfig::default()
        });
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let rhs = DVector::from_vec(vec![5.0, 6.0]);

        let (solution, stats) = solver.solve_dense(&matrix, &rhs).unwrap();

        assert!((solution[0] - 1.8).abs() < 1e-10);
        assert!((solution[1] - 1.4).abs() < 1e-10);
        assert_eq!(stats.method_used, SolverMethod::Qr);
    }

    #[test]
    fn test_complex_solver() {
        let solver = LinearSolver::new();
        let j = Complex::new(0.0, 1.0);
        let one = Complex::new(1.0, 0.0);
        // (1 + j) x = 2  =>  x = 1 - j
        let matrix = DMatrix::from_element(1, 1, one + j);
        let rhs = DVector::from_element(1, Complex::new(2.0, 0.0));

        let (solution, _) = solver.solve_dense(&matrix, &rhs).unwrap();
        assert!((solution[0] - Complex::new(1.0, -1.0)).norm() < 1e-12);
    }

    #[test]
    fn test_singular_matrix() {
        let solver = LinearSolver::new();
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 0.0]);
        let rhs = DVector::from_vec(vec![1.0, 2.0]);

        assert!(matches!(
            solver.solve_dense(&matrix, &rhs),
            Err(SimError::SingularSystem { .. })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let solver = LinearSolver::new();
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let rhs = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        assert!(matches!(
            solver.solve_dense(&matrix, &rhs),
            Err(SimError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }
}
