//! Rate ingestion: database records through the kernels into block-pair
//! buckets.

use super::model::{KineticsState, MergePolicy, Rate};
use crate::database::{BoundFreeRecord, LinePairRecord, RateFile, read_rate_file};
use crate::domain::{CrmError, CrmResult, RateKind};
use crate::physics::{RateKernels, TransitionInput};

/// Highest recombined step whose radiative decays are kept without a coupled
/// parent.
const DECOUPLED_DECAY_MAX_N: u32 = 10;

impl KineticsState {
    pub fn load_all_rates(&mut self, kernels: &dyn RateKernels) -> CrmResult<()> {
        for kind in RateKind::ALL {
            self.load_rates(kind, kernels)?;
        }
        Ok(())
    }

    /// Replaces every ion's rates of `kind` with the database contents and
    /// runs the matching series extrapolation.
    pub fn load_rates(&mut self, kind: RateKind, kernels: &dyn RateKernels) -> CrmResult<()> {
        self.require_blocks()?;
        for ion in &mut self.ions {
            ion.rates.get_mut(kind).clear();
        }
        if kind.couples_stages() && !self.parent.is_coupled() {
            tracing::debug!(kind = %kind, "ionized parent is decoupled, rates not loaded");
            return Ok(());
        }

        for index in 0..self.ions.len() {
            let path = self.ions[index].prefix.rate_file(kind);
            match kind {
                RateKind::Excitation | RateKind::Radiative => {
                    if let Some(file) = read_rate_file::<LinePairRecord>(&path)? {
                        self.ingest_line_pairs(index, kind, &file, kernels)?;
                    }
                    if kind == RateKind::Radiative && self.parent.is_coupled() {
                        self.extrapolate_radiative(index)?;
                    }
                    if index == 0 && !self.parent.ionized_map.is_empty() {
                        self.ingest_parent_line_pairs(kind, kernels)?;
                    }
                }
                RateKind::Ionization | RateKind::Recombination | RateKind::Autoionization => {
                    if let Some(file) = read_rate_file::<BoundFreeRecord>(&path)? {
                        self.ingest_bound_free(index, kind, &file, kernels)?;
                    }
                    match kind {
                        RateKind::Recombination => {
                            self.extrapolate_recombination(index, kernels)?
                        }
                        RateKind::Autoionization => {
                            self.extrapolate_autoionization(index, kernels)?
                        }
                        _ => {}
                    }
                }
            }

            let buckets = self.ions[index].rates.get(kind);
            tracing::debug!(
                ion = index,
                kind = %kind,
                buckets = buckets.len(),
                rates = buckets.rate_count(),
                "rates loaded"
            );
        }
        Ok(())
    }

    fn ingest_line_pairs(
        &mut self,
        index: usize,
        kind: RateKind,
        file: &RateFile<LinePairRecord>,
        kernels: &dyn RateKernels,
    ) -> CrmResult<()> {
        let nele = self.ions[index].nele;
        // Ionized-stage transitions belong to the previous ion or the parent
        // database once either exists.
        let skip_ionized = index > 0 || !self.parent.ionized_map.is_empty();
        for block in &file.blocks {
            let ionized = block.nele + 1 == nele;
            if block.nele != nele && !ionized {
                continue;
            }
            if ionized && skip_ionized {
                continue;
            }
            let policy = merge_policy(kind, block.merges_multipoles());
            for record in &block.transitions {
                if kind == RateKind::Radiative
                    && self.drops_decoupled_decay(index, record.upper)?
                {
                    continue;
                }
                let ion = &self.ions[index];
                let energy = ion.transition_energy(record.upper, record.lower)?;
                let (i, f) = line_pair_direction(kind, record.lower, record.upper);
                let rate = evaluate(
                    kernels,
                    kind,
                    ion.level(i)?.j,
                    ion.level(f)?.j,
                    i,
                    f,
                    energy,
                    &record.params,
                );
                self.ions[index].add_rate(kind, rate, policy)?;
            }
        }
        Ok(())
    }

    /// Decays out of recombined steps above [`DECOUPLED_DECAY_MAX_N`] are
    /// dropped while the parent is decoupled.
    fn drops_decoupled_decay(&self, index: usize, upper: usize) -> CrmResult<bool> {
        if self.parent.is_coupled() {
            return Ok(false);
        }
        let block = self.ions[index].level(upper)?.block;
        Ok(self.blocks[block]
            .series
            .is_some_and(|link| link.n > DECOUPLED_DECAY_MAX_N))
    }

    /// Excitation and radiative rates among the parent's own levels, mapped
    /// onto the first ion's ionized levels.
    fn ingest_parent_line_pairs(
        &mut self,
        kind: RateKind,
        kernels: &dyn RateKernels,
    ) -> CrmResult<()> {
        let Some(prefix) = self.parent.prefix.as_ref() else {
            return Ok(());
        };
        let Some(file) = read_rate_file::<LinePairRecord>(&prefix.rate_file(kind))? else {
            return Ok(());
        };
        let parent_nele = self.parent.nele;
        let mut mapped = Vec::new();
        for block in file.blocks.iter().filter(|block| block.nele == parent_nele) {
            let policy = merge_policy(kind, block.merges_multipoles());
            for record in &block.transitions {
                let (Some(lower), Some(upper)) = (
                    self.parent.host_level(record.lower),
                    self.parent.host_level(record.upper),
                ) else {
                    continue;
                };
                let energy = upper.energy - lower.energy;
                let (i, f) = line_pair_direction(kind, lower.host_level, upper.host_level);
                let ion = &self.ions[0];
                let rate = evaluate(
                    kernels,
                    kind,
                    ion.level(i)?.j,
                    ion.level(f)?.j,
                    i,
                    f,
                    energy,
                    &record.params,
                );
                mapped.push((rate, policy));
            }
        }
        for (rate, policy) in mapped {
            self.ions[0].add_rate(kind, rate, policy)?;
        }
        Ok(())
    }

    fn ingest_bound_free(
        &mut self,
        index: usize,
        kind: RateKind,
        file: &RateFile<BoundFreeRecord>,
        kernels: &dyn RateKernels,
    ) -> CrmResult<()> {
        for block in &file.blocks {
            for record in &block.transitions {
                let ion = &self.ions[index];
                let (i, f, energy) = match kind {
                    RateKind::Autoionization => (
                        record.bound,
                        record.free,
                        ion.transition_energy(record.bound, record.free)?,
                    ),
                    RateKind::Recombination => {
                        let energy = ion.transition_energy(record.free, record.bound)?;
                        if energy < 0.0 {
                            return Err(CrmError::input_validation(
                                "INPUT.NEGATIVE_ENERGY",
                                format!(
                                    "recombination from level {} ({:.6e}) into level {} ({:.6e}) of ion nele={} has negative energy",
                                    record.free,
                                    ion.level(record.free)?.energy,
                                    record.bound,
                                    ion.level(record.bound)?.energy,
                                    ion.nele
                                ),
                            ));
                        }
                        (record.free, record.bound, energy)
                    }
                    _ => (
                        record.bound,
                        record.free,
                        ion.transition_energy(record.free, record.bound)?,
                    ),
                };
                let rate = evaluate(
                    kernels,
                    kind,
                    ion.level(i)?.j,
                    ion.level(f)?.j,
                    i,
                    f,
                    energy,
                    &record.params,
                );
                self.ions[index].add_rate(kind, rate, MergePolicy::Append)?;
            }
        }
        Ok(())
    }
}

fn merge_policy(kind: RateKind, merges_multipoles: bool) -> MergePolicy {
    if kind == RateKind::Radiative && merges_multipoles {
        MergePolicy::MergeLevelPair
    } else {
        MergePolicy::Append
    }
}

/// Excitation runs lower to upper, radiative decay upper to lower.
fn line_pair_direction(kind: RateKind, lower: usize, upper: usize) -> (usize, usize) {
    if kind == RateKind::Radiative {
        (upper, lower)
    } else {
        (lower, upper)
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate(
    kernels: &dyn RateKernels,
    kind: RateKind,
    j_initial: i32,
    j_final: i32,
    initial: usize,
    final_level: usize,
    energy: f64,
    params: &[f64],
) -> Rate {
    let pair = kernels.evaluate(
        kind,
        &TransitionInput {
            j_initial,
            j_final,
            energy,
            params,
            initial,
            final_level,
        },
    );
    Rate::new(initial, final_level, pair.forward, pair.reverse)
}
