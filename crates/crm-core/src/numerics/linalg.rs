use super::DenseMatrix;

const SINGULAR_RELATIVE_EPSILON: f64 = 1.0e-13;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LuError {
    #[error("LU factorization requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("LU factorization requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("matrix contains a non-finite entry at ({row}, {col})")]
    NonFiniteEntry { row: usize, col: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    lu: DenseMatrix,
    pivots: Vec<usize>,
    pivot_sign: i32,
}

impl LuDecomposition {
    pub fn dimension(&self) -> usize {
        self.lu.nrows()
    }

    pub fn lu_matrix(&self) -> &DenseMatrix {
        &self.lu
    }

    pub fn pivots(&self) -> &[usize] {
        &self.pivots
    }

    pub fn pivot_sign(&self) -> i32 {
        self.pivot_sign
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
        let dimension = self.dimension();
        if rhs.len() != dimension {
            return Err(LuError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut forward = vec![0.0; dimension];
        for row in 0..dimension {
            let mut value = rhs[self.pivots[row]];
            for col in 0..row {
                value -= self.lu[(row, col)] * forward[col];
            }
            forward[row] = value;
        }

        let mut solution = vec![0.0; dimension];
        for row in (0..dimension).rev() {
            let mut value = forward[row];
            for col in (row + 1)..dimension {
                value -= self.lu[(row, col)] * solution[col];
            }

            let diagonal = self.lu[(row, row)];
            if diagonal == 0.0 {
                return Err(LuError::SingularMatrix { pivot_index: row });
            }

            solution[row] = value / diagonal;
        }

        Ok(solution)
    }
}

/// Partial-pivoting LU. A pivot is rejected when it falls below
/// `SINGULAR_RELATIVE_EPSILON` times the largest entry of the input.
pub fn lu_factorize(matrix: &DenseMatrix) -> Result<LuDecomposition, LuError> {
    let dimension = validate_square_shape(matrix)?;
    let scale = max_abs_entry(matrix)?;
    let threshold = if scale > 0.0 {
        scale * SINGULAR_RELATIVE_EPSILON
    } else {
        f64::MIN_POSITIVE
    };
    let mut lu = matrix.clone();
    let mut pivots: Vec<usize> = (0..dimension).collect();
    let mut pivot_sign = 1;

    for pivot_col in 0..dimension {
        let (pivot_row, pivot_abs) = select_pivot_row(&lu, pivot_col);
        if pivot_abs <= threshold {
            return Err(LuError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            swap_rows(&mut lu, pivot_col, pivot_row);
            pivots.swap(pivot_col, pivot_row);
            pivot_sign = -pivot_sign;
        }

        let pivot = lu[(pivot_col, pivot_col)];
        for row in (pivot_col + 1)..dimension {
            lu[(row, pivot_col)] /= pivot;
            let multiplier = lu[(row, pivot_col)];
            if multiplier == 0.0 {
                continue;
            }
            for col in (pivot_col + 1)..dimension {
                let updated = lu[(row, col)] - multiplier * lu[(pivot_col, col)];
                lu[(row, col)] = updated;
            }
        }
    }

    Ok(LuDecomposition {
        lu,
        pivots,
        pivot_sign,
    })
}

pub fn lu_solve(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
    lu_factorize(matrix)?.solve(rhs)
}

/// Seam between the block balance and whichever dense solver backs it.
pub trait DenseSolver {
    fn solve_dense(&self, matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LuError>;
}

/// Row-equilibrated partial-pivoting LU.
///
/// Balance rows mix rates spanning many decades with unit abundance rows, so
/// every row (and its right-hand side) is scaled by its largest entry before
/// factorization.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquilibratedLu;

impl DenseSolver for EquilibratedLu {
    fn solve_dense(&self, matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
        let dimension = validate_square_shape(matrix)?;
        if rhs.len() != dimension {
            return Err(LuError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut scaled = matrix.clone();
        let mut scaled_rhs = rhs.to_vec();
        for row in 0..dimension {
            let mut row_max: f64 = 0.0;
            for col in 0..dimension {
                row_max = row_max.max(scaled[(row, col)].abs());
            }
            if row_max == 0.0 {
                return Err(LuError::SingularMatrix { pivot_index: row });
            }
            for col in 0..dimension {
                scaled[(row, col)] /= row_max;
            }
            scaled_rhs[row] /= row_max;
        }

        lu_solve(&scaled, &scaled_rhs)
    }
}

fn validate_square_shape(matrix: &DenseMatrix) -> Result<usize, LuError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(LuError::EmptyMatrix);
    }
    if rows != cols {
        return Err(LuError::NonSquareMatrix { rows, cols });
    }

    Ok(rows)
}

fn max_abs_entry(matrix: &DenseMatrix) -> Result<f64, LuError> {
    let mut best: f64 = 0.0;
    for row in 0..matrix.nrows() {
        for col in 0..matrix.ncols() {
            let value = matrix[(row, col)];
            if !value.is_finite() {
                return Err(LuError::NonFiniteEntry { row, col });
            }
            best = best.max(value.abs());
        }
    }
    Ok(best)
}

fn select_pivot_row(matrix: &DenseMatrix, pivot_col: usize) -> (usize, f64) {
    let dimension = matrix.nrows();
    let mut best_row = pivot_col;
    let mut best_abs = matrix[(pivot_col, pivot_col)].abs();

    for row in (pivot_col + 1)..dimension {
        let candidate = matrix[(row, pivot_col)].abs();
        if candidate > best_abs {
            best_abs = candidate;
            best_row = row;
        }
    }

    (best_row, best_abs)
}

fn swap_rows(matrix: &mut DenseMatrix, lhs: usize, rhs: usize) {
    if lhs == rhs {
        return;
    }

    for col in 0..matrix.ncols() {
        let value = matrix[(lhs, col)];
        matrix[(lhs, col)] = matrix[(rhs, col)];
        matrix[(rhs, col)] = value;
    }
}
