//! The two convergence loops.

use super::model::KineticsState;
use super::relaxation::RelaxationPass;
use crate::domain::CrmResult;
use crate::numerics::DenseSolver;
use crate::physics::RateKernels;
use serde::{Deserialize, Serialize};

/// Outcome of one loop. Hitting the iteration cap is not an error; the
/// populations are used as they stand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceReport {
    pub iterations: usize,
    /// Last mean relative change; infinite when no sweep ran.
    pub metric: f64,
    pub converged: bool,
}

impl ConvergenceReport {
    fn not_started() -> Self {
        Self {
            iterations: 0,
            metric: f64::INFINITY,
            converged: false,
        }
    }
}

/// Reports of a full steady-state run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KineticsSummary {
    pub populate: ConvergenceReport,
    /// `None` when cascade mode is off.
    pub cascade: Option<ConvergenceReport>,
}

impl KineticsState {
    /// Alternates block solves and relaxation sweeps until the metric drops
    /// below `iter_accuracy` or `max_iter` sweeps ran.
    pub fn populate(&mut self, solver: &dyn DenseSolver) -> CrmResult<ConvergenceReport> {
        self.require_blocks()?;
        let accuracy = self.config.iter_accuracy;
        let mut report = ConvergenceReport::not_started();
        for iteration in 0..self.config.max_iter {
            self.assemble_block_matrix()?;
            self.solve_block_populations(solver)?;
            let metric = self.relax(RelaxationPass::Populate(iteration));
            tracing::info!(iteration, metric, "populate iteration");
            report = ConvergenceReport {
                iterations: iteration + 1,
                metric,
                converged: metric < accuracy,
            };
            if report.converged {
                break;
            }
        }
        if !report.converged {
            tracing::warn!(
                max_iter = self.config.max_iter,
                metric = report.metric,
                "populate loop reached the iteration cap"
            );
        }
        Ok(report)
    }

    /// Propagates population through the recombined series without new
    /// block solves. `None` when cascade mode is off.
    pub fn cascade(&mut self) -> Option<ConvergenceReport> {
        if !self.config.cascade {
            return None;
        }
        let accuracy = self.config.cascade_accuracy;
        let mut report = ConvergenceReport {
            iterations: 0,
            metric: self.relax(RelaxationPass::Cascade(1)),
            converged: false,
        };
        for pass in 1..=self.config.max_iter {
            let metric = self.relax(RelaxationPass::Cascade(pass));
            tracing::info!(iteration = pass, metric, "cascade iteration");
            report = ConvergenceReport {
                iterations: pass,
                metric,
                converged: metric < accuracy,
            };
            if report.converged {
                break;
            }
        }
        if !report.converged {
            tracing::warn!(
                max_iter = self.config.max_iter,
                metric = report.metric,
                "cascade loop reached the iteration cap"
            );
        }
        Some(report)
    }

    /// Loads every rate kind, initialises the blocks and runs both loops.
    pub fn solve_steady_state(
        &mut self,
        kernels: &dyn RateKernels,
        solver: &dyn DenseSolver,
    ) -> CrmResult<KineticsSummary> {
        self.load_all_rates(kernels)?;
        self.init_blocks();
        let populate = self.populate(solver)?;
        let cascade = self.cascade();
        Ok(KineticsSummary { populate, cascade })
    }
}

#[cfg(test)]
mod tests {
    use crate::common::config::KineticsConfig;
    use crate::domain::CrmErrorCategory;
    use crate::kinetics::KineticsState;
    use crate::numerics::EquilibratedLu;

    #[test]
    fn populate_requires_blocks() {
        let mut state = KineticsState::new(KineticsConfig::default());
        let error = state.populate(&EquilibratedLu).expect_err("no blocks");
        assert_eq!(error.category(), CrmErrorCategory::InputValidationError);
        assert_eq!(error.placeholder(), "INPUT.BLOCKS_NOT_SET");
    }

    #[test]
    fn cascade_is_skipped_when_disabled() {
        let mut config = KineticsConfig::default();
        config.set_cascade(false, 0.0);
        let mut state = KineticsState::new(config);
        assert!(state.cascade().is_none());
    }

    #[test]
    fn zero_iteration_cap_reports_unconverged() {
        let mut config = KineticsConfig::default();
        config.set_iteration(0.0, 0.0, 0);
        let mut state = KineticsState::new(config);
        state.atom = 1;
        let report = state.populate(&EquilibratedLu).expect("nothing to solve");
        assert_eq!(report.iterations, 0);
        assert!(!report.converged);
        assert!(report.metric.is_infinite());
    }
}
