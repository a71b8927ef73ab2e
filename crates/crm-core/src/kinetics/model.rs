use super::matrix::BlockMatrix;
use super::signature::ConfigSignature;
use crate::common::config::KineticsConfig;
use crate::database::DatabasePrefix;
use crate::domain::{CrmError, CrmResult, RateKind, StageId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    /// Hartree.
    pub energy: f64,
    /// Doubled total angular momentum.
    pub j: i32,
    pub block: usize,
    /// Position of the level inside its block.
    pub slot: usize,
}

impl Level {
    pub fn weight(&self) -> f64 {
        f64::from(self.j) + 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesLink {
    pub series: usize,
    pub n: u32,
}

/// A kinetics node: levels of one configuration signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub index: usize,
    pub stage: StageId,
    pub signature: ConfigSignature,
    pub series: Option<SeriesLink>,
    /// Block total density.
    pub nb: f64,
    pub n: Vec<f64>,
    pub n0: Vec<f64>,
    /// Normalized per-level fractions, `n / nb`.
    pub r: Vec<f64>,
    pub total_rate: Vec<f64>,
}

impl Block {
    pub fn new(
        index: usize,
        stage: StageId,
        signature: ConfigSignature,
        level_count: usize,
    ) -> Self {
        let mut block = Self {
            index,
            stage,
            signature,
            series: None,
            nb: 1.0,
            n: vec![0.0; level_count],
            n0: vec![0.0; level_count],
            r: vec![0.0; level_count],
            total_rate: vec![0.0; level_count],
        };
        block.collapse();
        block
    }

    pub fn level_count(&self) -> usize {
        self.n.len()
    }

    pub fn is_series(&self) -> bool {
        self.series.is_some()
    }

    pub(crate) fn push_level(&mut self) -> usize {
        self.n.push(0.0);
        self.n0.push(0.0);
        self.r.push(0.0);
        self.total_rate.push(0.0);
        if self.n.len() == 1 {
            self.r[0] = 1.0;
        }
        self.n.len() - 1
    }

    /// `r = [1, 0, ...]` with zero populations.
    pub(crate) fn collapse(&mut self) {
        self.n.fill(0.0);
        self.n0.fill(0.0);
        self.r.fill(0.0);
        if let Some(first) = self.r.first_mut() {
            *first = 1.0;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.nb = 1.0;
        self.total_rate.fill(0.0);
        self.collapse();
    }
}

/// One principal quantum number of a recombined series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesStep {
    pub n: u32,
    pub imin: usize,
    pub imax: usize,
    pub block: usize,
    pub extrapolated: bool,
}

impl SeriesStep {
    pub fn width(&self) -> usize {
        self.imax - self.imin + 1
    }

    pub fn contains(&self, level: usize) -> bool {
        (self.imin..=self.imax).contains(&level)
    }
}

/// Rydberg sequence built on the core level range `[bmin, bmax]` of the
/// ionized stage. Steps are kept in increasing `n`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecombinedSeries {
    pub bmin: usize,
    pub bmax: usize,
    pub steps: Vec<SeriesStep>,
    /// Highest principal quantum number carried by the series.
    pub n_ext: u32,
}

impl RecombinedSeries {
    pub fn new(bmin: usize, bmax: usize, first: SeriesStep) -> Self {
        Self {
            bmin,
            bmax,
            n_ext: first.n,
            steps: vec![first],
        }
    }

    pub(crate) fn insert_step(&mut self, step: SeriesStep) {
        let position = self.steps.partition_point(|existing| existing.n < step.n);
        self.steps.insert(position, step);
        self.n_ext = self.n_ext.max(step.n);
    }

    pub fn step(&self, n: u32) -> Option<&SeriesStep> {
        self.steps.iter().find(|step| step.n == n)
    }

    pub fn explicit_steps(&self) -> impl DoubleEndedIterator<Item = &SeriesStep> {
        self.steps.iter().filter(|step| !step.extrapolated)
    }

    pub fn extrapolated_steps(&self) -> impl DoubleEndedIterator<Item = &SeriesStep> {
        self.steps.iter().filter(|step| step.extrapolated)
    }

    /// Highest tabulated step and the tabulated step right below it.
    pub fn last_explicit_pair(&self) -> Option<(SeriesStep, Option<SeriesStep>)> {
        let mut explicit = self.explicit_steps().rev();
        let last = *explicit.next()?;
        Some((last, explicit.next().copied()))
    }

    /// Rate extrapolation only touches series that gained synthetic steps.
    pub fn is_extrapolated(&self) -> bool {
        self.steps.iter().any(|step| step.extrapolated)
    }

    pub fn highest_step(&self) -> Option<&SeriesStep> {
        self.steps.last()
    }
}

/// Directed level-to-level edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub i: usize,
    pub f: usize,
    pub dir: f64,
    pub inv: f64,
}

impl Rate {
    pub const fn new(i: usize, f: usize, dir: f64, inv: f64) -> Self {
        Self { i, f, dir, inv }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRateBucket {
    pub origin: usize,
    pub destination: usize,
    pub rates: Vec<Rate>,
}

impl BlockRateBucket {
    pub fn is_internal(&self) -> bool {
        self.origin == self.destination
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    Append,
    /// Accumulate onto an existing rate with the same level pair.
    MergeLevelPair,
}

/// At most one bucket per ordered (origin block, destination block) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateBuckets {
    buckets: Vec<BlockRateBucket>,
    index: HashMap<(usize, usize), usize>,
}

impl RateBuckets {
    pub fn insert(&mut self, origin: usize, destination: usize, rate: Rate, policy: MergePolicy) {
        let slot = *self.index.entry((origin, destination)).or_insert_with(|| {
            self.buckets.push(BlockRateBucket {
                origin,
                destination,
                rates: Vec::new(),
            });
            self.buckets.len() - 1
        });
        let bucket = &mut self.buckets[slot];

        if policy == MergePolicy::MergeLevelPair {
            if let Some(existing) = bucket
                .rates
                .iter_mut()
                .find(|existing| existing.i == rate.i && existing.f == rate.f)
            {
                existing.dir += rate.dir;
                existing.inv += rate.inv;
                return;
            }
        }
        bucket.rates.push(rate);
    }

    pub fn get(&self, origin: usize, destination: usize) -> Option<&BlockRateBucket> {
        self.index
            .get(&(origin, destination))
            .map(|slot| &self.buckets[*slot])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockRateBucket> {
        self.buckets.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, BlockRateBucket> {
        self.buckets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn rate_count(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.rates.len()).sum()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTables {
    excitation: RateBuckets,
    radiative: RateBuckets,
    ionization: RateBuckets,
    recombination: RateBuckets,
    autoionization: RateBuckets,
}

impl RateTables {
    pub fn get(&self, kind: RateKind) -> &RateBuckets {
        match kind {
            RateKind::Excitation => &self.excitation,
            RateKind::Radiative => &self.radiative,
            RateKind::Ionization => &self.ionization,
            RateKind::Recombination => &self.recombination,
            RateKind::Autoionization => &self.autoionization,
        }
    }

    pub fn get_mut(&mut self, kind: RateKind) -> &mut RateBuckets {
        match kind {
            RateKind::Excitation => &mut self.excitation,
            RateKind::Radiative => &mut self.radiative,
            RateKind::Ionization => &mut self.ionization,
            RateKind::Recombination => &mut self.recombination,
            RateKind::Autoionization => &mut self.autoionization,
        }
    }

    pub fn clear(&mut self) {
        for kind in RateKind::ALL {
            self.get_mut(kind).clear();
        }
    }
}

/// One configured charge state.
#[derive(Debug, Clone, PartialEq)]
pub struct Ion {
    pub nele: u32,
    /// `None` leaves the stage population to the balance equations.
    pub abundance: Option<f64>,
    pub prefix: DatabasePrefix,
    /// Own levels and ionized-stage levels, indexed by database level index.
    pub levels: Vec<Level>,
    pub rates: RateTables,
    pub series: Vec<RecombinedSeries>,
}

impl Ion {
    pub fn new(nele: u32, abundance: Option<f64>, prefix: DatabasePrefix) -> Self {
        Self {
            nele,
            abundance,
            prefix,
            levels: Vec::new(),
            rates: RateTables::default(),
            series: Vec::new(),
        }
    }

    pub fn level(&self, index: usize) -> CrmResult<&Level> {
        self.levels.get(index).ok_or_else(|| {
            CrmError::input_validation(
                "INPUT.LEVEL_INDEX",
                format!(
                    "level index {} is out of range for ion with nele={} ({} levels)",
                    index,
                    self.nele,
                    self.levels.len()
                ),
            )
        })
    }

    /// Single choke point feeding rates into the block-pair buckets.
    pub fn add_rate(&mut self, kind: RateKind, rate: Rate, policy: MergePolicy) -> CrmResult<()> {
        let origin = self.level(rate.i)?.block;
        let destination = self.level(rate.f)?.block;
        self.rates
            .get_mut(kind)
            .insert(origin, destination, rate, policy);
        Ok(())
    }

    pub fn transition_energy(&self, upper: usize, lower: usize) -> CrmResult<f64> {
        Ok(self.level(upper)?.energy - self.level(lower)?.energy)
    }
}

/// Ionized level of the first ion matched to a level of the parent's own
/// level file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IonizedLevel {
    pub parent_level: usize,
    pub host_level: usize,
    /// Energy in the parent file's own scale.
    pub energy: f64,
}

/// The ionized stage below the first configured ion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentStage {
    pub nele: u32,
    /// `None` disables every process coupling the parent to the ions.
    pub abundance: Option<f64>,
    pub prefix: Option<DatabasePrefix>,
    pub ionized_map: Vec<IonizedLevel>,
}

impl ParentStage {
    pub fn is_coupled(&self) -> bool {
        self.abundance.is_some()
    }

    pub fn host_level(&self, parent_level: usize) -> Option<&IonizedLevel> {
        self.ionized_map
            .iter()
            .find(|entry| entry.parent_level == parent_level)
    }
}

/// Abundance override for the stage with `nele` electrons; `None` frees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbundancePin {
    pub nele: u32,
    pub abundance: Option<f64>,
}

/// Every piece of mutable kinetics state for one run.
#[derive(Debug, Clone, Default)]
pub struct KineticsState {
    pub config: KineticsConfig,
    pub atom: u32,
    pub symbol: String,
    pub parent: ParentStage,
    pub ions: Vec<Ion>,
    pub blocks: Vec<Block>,
    /// Balance workspace reused across populate iterations.
    pub(crate) matrix: Option<BlockMatrix>,
}

impl KineticsState {
    pub fn new(config: KineticsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Returns the number of configured ions.
    pub fn add_ion(&mut self, nele: u32, abundance: Option<f64>, prefix: DatabasePrefix) -> usize {
        self.ions.push(Ion::new(nele, abundance, prefix));
        self.ions.len()
    }

    /// Pins the abundance of the stage with `nele` electrons, parent included.
    /// Returns `false` when no such stage is configured.
    pub fn set_abundance(&mut self, nele: u32, abundance: Option<f64>) -> bool {
        if self.blocks_ready() && self.parent.nele == nele {
            self.parent.abundance = abundance;
            return true;
        }
        match self.ions.iter_mut().find(|ion| ion.nele == nele) {
            Some(ion) => {
                ion.abundance = abundance;
                true
            }
            None => false,
        }
    }

    /// Applies abundance overrides to built blocks. The parent keeps the
    /// coupling it was built with, since series extrapolation depends on it.
    pub fn pin_abundances(&mut self, pins: &[AbundancePin]) -> CrmResult<()> {
        self.require_blocks()?;
        for pin in pins {
            if pin.nele == self.parent.nele
                && pin.abundance.is_some() != self.parent.is_coupled()
            {
                return Err(CrmError::input_validation(
                    "INPUT.PARENT_COUPLING",
                    format!(
                        "the ionized parent (nele={}) cannot be coupled or decoupled after blocks are built",
                        pin.nele
                    ),
                ));
            }
            if !self.set_abundance(pin.nele, pin.abundance) {
                return Err(CrmError::input_validation(
                    "INPUT.UNKNOWN_STAGE",
                    format!("no configured stage has nele={}", pin.nele),
                ));
            }
            tracing::debug!(nele = pin.nele, abundance = ?pin.abundance, "abundance pinned");
        }
        Ok(())
    }

    pub fn blocks_ready(&self) -> bool {
        self.atom > 0
    }

    pub fn stage_abundance(&self, stage: StageId) -> Option<f64> {
        match stage {
            StageId::Parent => self.parent.abundance,
            StageId::Ion(index) => self.ions.get(index).and_then(|ion| ion.abundance),
        }
    }

    /// Maximal runs of consecutive blocks owned by one stage.
    pub fn stage_runs(&self) -> Vec<(StageId, std::ops::Range<usize>)> {
        let mut runs: Vec<(StageId, std::ops::Range<usize>)> = Vec::new();
        for block in &self.blocks {
            match runs.last_mut() {
                Some((stage, range)) if *stage == block.stage => range.end = block.index + 1,
                _ => runs.push((block.stage, block.index..block.index + 1)),
            }
        }
        runs
    }

    pub(crate) fn require_blocks(&self) -> CrmResult<()> {
        if self.blocks_ready() {
            Ok(())
        } else {
            Err(CrmError::input_validation(
                "INPUT.BLOCKS_NOT_SET",
                "blocks are not initialized; build blocks before loading rates",
            ))
        }
    }
}
