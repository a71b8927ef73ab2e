//! Steady-state balance over block totals.
//!
//! Assembly fills `transfer[(origin, destination)]` with the rate at which a
//! unit of population in `origin` flows into `destination`, weighted by the
//! origin block's current level fractions. Every diagonal holds minus its
//! row's outflow, so the rows of `transfer` sum to zero. The linear system
//! solved for block totals is the transpose, with the first row of every
//! pinned stage replaced by its abundance constraint.

use super::flux::EdgeFlux;
use super::model::KineticsState;
use crate::common::constants::is_negligible;
use crate::domain::{CrmError, CrmResult, RateKind, StageId};
use crate::numerics::{DenseMatrix, DenseSolver};

#[derive(Debug, Clone)]
pub struct BlockMatrix {
    pub transfer: DenseMatrix,
    pub balance: DenseMatrix,
    pub rhs: Vec<f64>,
}

impl BlockMatrix {
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            transfer: DenseMatrix::zeros(dimension, dimension),
            balance: DenseMatrix::zeros(dimension, dimension),
            rhs: vec![0.0; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.rhs.len()
    }

    fn clear(&mut self) {
        let dimension = self.dimension();
        for row in 0..dimension {
            for col in 0..dimension {
                self.transfer[(row, col)] = 0.0;
                self.balance[(row, col)] = 0.0;
            }
        }
        self.rhs.fill(0.0);
    }

    /// Rows with no resolvable balance; their blocks get zero population.
    pub fn is_elided(&self, row: usize) -> bool {
        is_negligible(self.balance[(row, row)])
    }

    pub fn retained_rows(&self) -> Vec<usize> {
        (0..self.dimension())
            .filter(|row| !self.is_elided(*row))
            .collect()
    }
}

impl KineticsState {
    /// Pinned abundance used for a stage's constraint row. A decoupled parent
    /// is held at zero.
    fn constraint_abundance(&self, stage: StageId) -> Option<f64> {
        match stage {
            StageId::Parent => Some(self.parent.abundance.unwrap_or(0.0)),
            StageId::Ion(_) => self.stage_abundance(stage),
        }
    }

    pub fn assemble_block_matrix(&mut self) -> CrmResult<&BlockMatrix> {
        self.require_blocks()?;
        let dimension = self.blocks.len();
        let mut matrix = match self.matrix.take() {
            Some(mut matrix) if matrix.dimension() == dimension => {
                matrix.clear();
                matrix
            }
            _ => BlockMatrix::with_dimension(dimension),
        };

        let skip_series = self.config.cascade;
        for ion in &self.ions {
            for kind in RateKind::ALL {
                for bucket in ion.rates.get(kind).iter() {
                    if bucket.is_internal() {
                        continue;
                    }
                    let origin_block = &self.blocks[bucket.origin];
                    let destination_block = &self.blocks[bucket.destination];
                    if skip_series && (origin_block.is_series() || destination_block.is_series())
                    {
                        continue;
                    }
                    for rate in &bucket.rates {
                        let flux = EdgeFlux::of(kind, rate, ion, &self.config);
                        let fraction = origin_block.r[ion.levels[rate.i].slot];
                        if fraction > 0.0 {
                            matrix.transfer[(bucket.origin, bucket.destination)] +=
                                fraction * flux.forward;
                        }
                        let fraction = destination_block.r[ion.levels[rate.f].slot];
                        if flux.reverse > 0.0 && fraction > 0.0 {
                            matrix.transfer[(bucket.destination, bucket.origin)] +=
                                fraction * flux.reverse;
                        }
                    }
                }
            }
        }

        for row in 0..dimension {
            let outflow: f64 = (0..dimension)
                .filter(|col| *col != row)
                .map(|col| matrix.transfer[(row, col)])
                .sum();
            matrix.transfer[(row, row)] = -outflow;
        }
        for row in 0..dimension {
            for col in 0..dimension {
                matrix.balance[(row, col)] = matrix.transfer[(col, row)];
            }
        }

        for (stage, run) in self.stage_runs() {
            let Some(abundance) = self.constraint_abundance(stage) else {
                continue;
            };
            let row = run.start;
            for col in 0..dimension {
                matrix.balance[(row, col)] = if run.contains(&col) { 1.0 } else { 0.0 };
            }
            matrix.rhs[row] = abundance;
        }

        Ok(self.matrix.insert(matrix))
    }

    /// Solves the assembled balance for block totals and rescales every
    /// block's level fractions into populations.
    pub fn solve_block_populations(&mut self, solver: &dyn DenseSolver) -> CrmResult<()> {
        let Some(matrix) = self.matrix.as_ref() else {
            return Err(CrmError::internal(
                "SYS.MATRIX_NOT_ASSEMBLED",
                "block matrix must be assembled before solving",
            ));
        };
        let retained = matrix.retained_rows();
        let size = retained.len();
        let mut reduced = DenseMatrix::zeros(size, size);
        let mut rhs = vec![0.0; size];
        for (row, &source_row) in retained.iter().enumerate() {
            for (col, &source_col) in retained.iter().enumerate() {
                reduced[(row, col)] = matrix.balance[(source_row, source_col)];
            }
            rhs[row] = matrix.rhs[source_row];
        }

        let solution = solver.solve_dense(&reduced, &rhs).map_err(|error| {
            CrmError::computation(
                "RUN.SINGULAR_BLOCK_MATRIX",
                format!("reduced block balance of size {size} could not be solved: {error}"),
            )
        })?;
        let mut totals: Vec<Option<f64>> = vec![None; self.blocks.len()];
        for (row, &block) in retained.iter().enumerate() {
            totals[block] = Some(solution[row]);
        }

        let skip_series = self.config.cascade;
        for (block, total) in self.blocks.iter_mut().zip(totals) {
            if skip_series && block.is_series() {
                continue;
            }
            match total {
                Some(total) => {
                    block.nb = total;
                    for fraction in &mut block.r {
                        *fraction *= total;
                    }
                }
                None => {
                    block.nb = 0.0;
                    block.r.fill(0.0);
                }
            }
            block.n.fill(0.0);
        }
        Ok(())
    }

    pub fn block_matrix(&self) -> Option<&BlockMatrix> {
        self.matrix.as_ref()
    }
}
