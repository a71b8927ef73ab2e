//! Level-resolved relaxation around the block solution.

use super::flux::EdgeFlux;
use super::model::KineticsState;
use crate::common::constants::is_negligible;
use crate::domain::{RateKind, StageId};

/// One relaxation sweep.
///
/// `Populate(i)` follows the `i`-th block solve (0-based). `Cascade(k)` is the
/// `k`-th cascade pass (1-based), which works from the previous populations
/// without a new solve and includes the recombined series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxationPass {
    Populate(usize),
    Cascade(usize),
}

impl RelaxationPass {
    fn is_cascade(self) -> bool {
        matches!(self, Self::Cascade(_))
    }

    fn is_damped(self) -> bool {
        match self {
            Self::Populate(iteration) => iteration >= 2,
            Self::Cascade(pass) => pass >= 2,
        }
    }
}

impl KineticsState {
    /// Resets every block and accumulates each level's total depopulation
    /// rate.
    pub fn init_blocks(&mut self) {
        for block in &mut self.blocks {
            block.reset();
        }

        // `n` temporarily marks levels with a spontaneous decay channel.
        for ion in &self.ions {
            for kind in RateKind::ALL {
                let spontaneous = EdgeFlux::is_spontaneous(kind);
                for bucket in ion.rates.get(kind).iter() {
                    for rate in &bucket.rates {
                        let flux = EdgeFlux::of(kind, rate, ion, &self.config);
                        let origin = &ion.levels[rate.i];
                        let destination = &ion.levels[rate.f];
                        let block = &mut self.blocks[origin.block];
                        block.total_rate[origin.slot] += flux.forward;
                        if spontaneous && rate.dir > 0.0 {
                            block.n[origin.slot] += rate.dir;
                        }
                        self.blocks[destination.block].total_rate[destination.slot] +=
                            flux.reverse;
                    }
                }
            }
        }

        for block in &mut self.blocks {
            let prunes = block.level_count() > 1 && block.stage != StageId::Parent;
            for slot in 0..block.level_count() {
                if block.n[slot] > 0.0 {
                    block.n[slot] = 0.0;
                } else if prunes {
                    block.total_rate[slot] = 0.0;
                }
            }
        }
    }

    /// Runs one sweep and returns the mean relative change of the populated
    /// levels.
    pub fn relax(&mut self, pass: RelaxationPass) -> f64 {
        let cascade = pass.is_cascade();
        let skip_series = self.config.cascade && !cascade;
        let keep = 1.0 - self.config.iter_stabilizer;
        let take = self.config.iter_stabilizer;

        if cascade {
            for block in &mut self.blocks {
                block.r.copy_from_slice(&block.n);
                block.n.fill(0.0);
            }
        }

        for ion in &self.ions {
            for kind in RateKind::ALL {
                for bucket in ion.rates.get(kind).iter() {
                    if skip_series
                        && (self.blocks[bucket.origin].is_series()
                            || self.blocks[bucket.destination].is_series())
                    {
                        continue;
                    }
                    for rate in &bucket.rates {
                        let flux = EdgeFlux::of(kind, rate, ion, &self.config);
                        let origin = &ion.levels[rate.i];
                        let destination = &ion.levels[rate.f];
                        let source = self.blocks[origin.block].r[origin.slot];
                        if source > 0.0 {
                            self.blocks[destination.block].n[destination.slot] +=
                                source * flux.forward;
                        }
                        let source = self.blocks[destination.block].r[destination.slot];
                        if flux.reverse > 0.0 && source > 0.0 {
                            self.blocks[origin.block].n[origin.slot] += source * flux.reverse;
                        }
                    }
                }
            }
        }

        let mut change = 0.0;
        let mut populated = 0usize;
        for block in &mut self.blocks {
            if skip_series && block.is_series() {
                continue;
            }
            let mut sum = 0.0;
            for slot in 0..block.level_count() {
                let total = block.total_rate[slot];
                if is_negligible(total) {
                    block.n[slot] = 0.0;
                } else {
                    block.n[slot] /= total;
                    sum += block.n[slot];
                }
            }
            if cascade {
                block.nb = sum;
            }
            if sum == 0.0 || block.nb == 0.0 {
                block.collapse();
                continue;
            }
            if cascade {
                continue;
            }

            let scale = block.nb / sum;
            for slot in 0..block.level_count() {
                block.n[slot] *= scale;
                if block.n[slot] > 0.0 {
                    change += (1.0 - block.n0[slot] / block.n[slot]).abs();
                    populated += 1;
                }
                if pass.is_damped() {
                    block.n[slot] = keep * block.n0[slot] + take * block.n[slot];
                }
                block.r[slot] = block.n[slot] / block.nb;
                block.n0[slot] = block.n[slot];
            }
        }

        if cascade {
            self.renormalize_stages();
            for block in &mut self.blocks {
                let series = block.is_series();
                for slot in 0..block.level_count() {
                    if block.n[slot] > 0.0 && !series {
                        change += (1.0 - block.n0[slot] / block.n[slot]).abs();
                        populated += 1;
                    }
                    if pass.is_damped() {
                        block.n[slot] = keep * block.n0[slot] + take * block.n[slot];
                    }
                    if block.nb != 0.0 {
                        block.r[slot] = block.n[slot] / block.nb;
                    }
                    block.n0[slot] = block.n[slot];
                }
            }
        }

        if populated == 0 {
            0.0
        } else {
            change / populated as f64
        }
    }

    /// Scales every stage back onto its pinned abundance after a cascade
    /// sweep.
    fn renormalize_stages(&mut self) {
        for (stage, run) in self.stage_runs() {
            let Some(target) = self.stage_abundance(stage).filter(|target| *target > 0.0) else {
                continue;
            };
            let sum: f64 = self.blocks[run.clone()].iter().map(|block| block.nb).sum();
            if sum <= 0.0 {
                continue;
            }
            let scale = target / sum;
            for block in &mut self.blocks[run] {
                block.nb *= scale;
                for population in &mut block.n {
                    *population *= scale;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RelaxationPass;
    use crate::common::config::KineticsConfig;
    use crate::database::DatabasePrefix;
    use crate::domain::{RateKind, StageId};
    use crate::kinetics::model::{Block, KineticsState, Level, MergePolicy, Rate};
    use crate::kinetics::signature::ConfigSignature;

    /// One ion with a two-level block (slots 0,1) followed by a singleton.
    fn state() -> KineticsState {
        let mut state = KineticsState::new(KineticsConfig::default());
        state.atom = 8;
        state.add_ion(3, Some(1.0), DatabasePrefix::new("o6"));
        state
            .blocks
            .push(Block::new(0, StageId::Ion(0), ConfigSignature::default(), 2));
        state
            .blocks
            .push(Block::new(1, StageId::Ion(0), ConfigSignature::default(), 1));
        for (block, slot) in [(0, 0), (0, 1), (1, 0)] {
            state.ions[0].levels.push(Level {
                energy: 0.0,
                j: 1,
                block,
                slot,
            });
        }
        state
    }

    fn add(state: &mut KineticsState, kind: RateKind, rate: Rate) {
        state.ions[0]
            .add_rate(kind, rate, MergePolicy::Append)
            .expect("levels exist");
    }

    #[test]
    fn levels_without_decay_lose_their_total_rate_in_multi_level_blocks() {
        let mut state = state();
        add(&mut state, RateKind::Excitation, Rate::new(0, 2, 10.0, 4.0));
        add(&mut state, RateKind::Radiative, Rate::new(1, 0, 2.0, 0.0));
        add(&mut state, RateKind::Radiative, Rate::new(2, 1, 5.0, 0.0));
        state.init_blocks();

        let ne = state.config.electron_density;
        assert_eq!(state.blocks[0].total_rate[0], 0.0);
        assert_eq!(state.blocks[0].total_rate[1], 2.0);
        assert_eq!(state.blocks[1].total_rate[0], 5.0 + ne * 4.0);
        assert!(state.blocks.iter().all(|block| block.n.iter().all(|n| *n == 0.0)));
        assert_eq!(state.blocks[0].r, vec![1.0, 0.0]);
    }

    #[test]
    fn populate_sweep_keeps_block_totals_and_reports_relative_change() {
        let mut state = state();
        add(&mut state, RateKind::Radiative, Rate::new(0, 1, 1.0, 0.0));
        add(&mut state, RateKind::Radiative, Rate::new(1, 0, 1.0, 0.0));
        state.init_blocks();
        state.blocks[0].nb = 2.0;
        state.blocks[0].r = vec![1.0, 1.0];

        let first = state.relax(RelaxationPass::Populate(0));
        assert_eq!(first, 1.0);
        assert_eq!(state.blocks[0].n, vec![1.0, 1.0]);
        assert_eq!(state.blocks[0].r, vec![0.5, 0.5]);

        state.blocks[0].r = vec![1.0, 1.0];
        state.blocks[0].n = vec![0.0, 0.0];
        let second = state.relax(RelaxationPass::Populate(1));
        assert_eq!(second, 0.0);
    }

    #[test]
    fn unpopulated_blocks_collapse() {
        let mut state = state();
        state.init_blocks();
        let metric = state.relax(RelaxationPass::Populate(3));
        assert_eq!(metric, 0.0);
        assert_eq!(state.blocks[0].r, vec![1.0, 0.0]);
        assert_eq!(state.blocks[1].r, vec![1.0]);
    }

    #[test]
    fn cascade_sweep_restores_stage_abundance() {
        let mut state = state();
        add(&mut state, RateKind::Radiative, Rate::new(0, 1, 1.0, 0.0));
        add(&mut state, RateKind::Radiative, Rate::new(1, 0, 1.0, 0.0));
        add(&mut state, RateKind::Radiative, Rate::new(2, 0, 4.0, 0.0));
        add(&mut state, RateKind::Excitation, Rate::new(0, 2, 1.0e3, 0.0));
        state.init_blocks();
        state.blocks[0].n = vec![0.5, 0.3];
        state.blocks[1].n = vec![0.2];

        state.relax(RelaxationPass::Cascade(1));
        let total: f64 = state.blocks.iter().map(|block| block.nb).sum();
        assert!((total - 1.0).abs() < 1.0e-12);
        for block in &state.blocks {
            let levels: f64 = block.n.iter().sum();
            assert!((levels - block.nb).abs() < 1.0e-12);
            assert_eq!(block.n, block.n0);
        }
    }
}
