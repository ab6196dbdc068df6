//! Dense matrices shared by every pipeline stage
//!
//! Stages exchange `nalgebra::DMatrix<f64>`. Rows index population groups,
//! columns index facilities or service categories depending on the stage.
//! The helpers here add what the stages need on top: shape checks tagged
//! with the stage, and a row fill that dispatches to Rayon. Each output row
//! is computed independently, so sequential and parallel results are
//! identical.

use crate::error::{BurdenError, Result, Stage};
use nalgebra::DMatrix;
use rayon::prelude::*;

pub type Matrix = DMatrix<f64>;

/// Fail with `DimensionMismatch` unless `matrix` is `expected`
pub fn ensure_shape(matrix: &Matrix, stage: Stage, expected: (usize, usize)) -> Result<()> {
    if matrix.shape() != expected {
        return Err(BurdenError::mismatch(stage, expected, matrix.shape()));
    }
    Ok(())
}

/// Fail with `InvalidInput` on the first negative or non-finite cell
pub fn ensure_finite_non_negative(matrix: &Matrix, stage: Stage) -> Result<()> {
    for row in 0..matrix.nrows() {
        for col in 0..matrix.ncols() {
            let value = matrix[(row, col)];
            if !value.is_finite() || value < 0.0 {
                return Err(BurdenError::InvalidInput(format!(
                    "{}: value {} at ({}, {}) must be finite and >= 0",
                    stage, value, row, col
                )));
            }
        }
    }
    Ok(())
}

/// Fill a new `rows × cols` matrix row by row. `fill(row, out)` writes one
/// output row.
///
/// Rows are dispatched to Rayon when `parallel` is set.
pub fn fill_rows<F>(rows: usize, cols: usize, parallel: bool, fill: F) -> Matrix
where
    F: Fn(usize, &mut [f64]) + Sync + Send,
{
    let mut data = vec![0.0; rows * cols];
    if cols > 0 {
        if parallel {
            data.par_chunks_mut(cols)
                .enumerate()
                .for_each(|(row, slot)| fill(row, slot));
        } else {
            data.chunks_mut(cols)
                .enumerate()
                .for_each(|(row, slot)| fill(row, slot));
        }
    }
    Matrix::from_row_slice(rows, cols, &data)
}

/// Dense product `lhs · rhs`, one output row at a time
///
/// Inner dimensions must agree; the error is tagged with `stage`.
pub fn product(lhs: &Matrix, rhs: &Matrix, stage: Stage, parallel: bool) -> Result<Matrix> {
    if lhs.ncols() != rhs.nrows() {
        return Err(BurdenError::mismatch(
            stage,
            (lhs.ncols(), rhs.ncols()),
            rhs.shape(),
        ));
    }
    Ok(fill_rows(lhs.nrows(), rhs.ncols(), parallel, |row, out| {
        let weighted = lhs.row(row) * rhs;
        out.copy_from_slice(weighted.as_slice());
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_product_known_values() {
        let a = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::from_row_slice(2, 3, &[5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);

        let c = product(&a, &b, Stage::EffortMatrix, false).unwrap();

        assert_eq!(c.shape(), (2, 3));
        assert_relative_eq!(c[(0, 0)], 21.0);
        assert_relative_eq!(c[(0, 2)], 27.0);
        assert_relative_eq!(c[(1, 1)], 54.0);
        assert_eq!(c, &a * &b);
    }

    #[test]
    fn test_product_parallel_matches_sequential() {
        let a = fill_rows(40, 17, false, |r, out| {
            for (c, v) in out.iter_mut().enumerate() {
                *v = ((r * 31 + c * 7) % 13) as f64 / 7.0;
            }
        });
        let b = fill_rows(17, 5, false, |r, out| {
            for (c, v) in out.iter_mut().enumerate() {
                *v = ((r + c) % 3) as f64 * 0.5;
            }
        });

        let seq = product(&a, &b, Stage::EffortMatrix, false).unwrap();
        let par = product(&a, &b, Stage::EffortMatrix, true).unwrap();
        assert_eq!(seq, par);
    }

    #[test]
    fn test_product_inner_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 2);
        let err = product(&a, &b, Stage::EffortMatrix, false).unwrap_err();
        assert!(matches!(err, BurdenError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_fill_rows_is_row_major() {
        let m = fill_rows(2, 3, false, |r, out| {
            for (c, v) in out.iter_mut().enumerate() {
                *v = (r * 10 + c) as f64;
            }
        });
        assert_eq!(m[(0, 2)], 2.0);
        assert_eq!(m[(1, 0)], 10.0);
    }

    #[test]
    fn test_finite_non_negative_check() {
        let ok = Matrix::from_row_slice(1, 2, &[0.0, 3.5]);
        assert!(ensure_finite_non_negative(&ok, Stage::Distance).is_ok());

        let negative = Matrix::from_row_slice(1, 2, &[0.0, -1.0]);
        let err = ensure_finite_non_negative(&negative, Stage::Distance).unwrap_err();
        assert!(err.to_string().contains("(0, 1)"));

        let nan = Matrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(ensure_finite_non_negative(&nan, Stage::Distance).is_err());
    }
}
