use crm_core::common::config::KineticsConfig;
use crm_core::database::DatabasePrefix;
use crm_core::domain::{RateKind, StageId};
use crm_core::kinetics::{AbundancePin, KineticsState};
use crm_core::numerics::EquilibratedLu;
use crm_core::physics::MaxwellianKernels;
use crm_core::report::PopulationReport;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_json(path: &Path, value: Value) {
    fs::write(path, serde_json::to_string_pretty(&value).expect("fixture should serialize"))
        .expect("fixture should be written");
}

/// He-like and Li-like carbon, two levels each, one excitation and one
/// radiative line per stage.
fn two_stage_database(root: &Path) -> (DatabasePrefix, DatabasePrefix) {
    let he = DatabasePrefix::new(root.join("c5"));
    let li = DatabasePrefix::new(root.join("c4"));

    write_json(
        &he.energy_file(),
        json!({
            "atom": 6,
            "symbol": "C",
            "blocks": [
                { "nele": 2, "levels": [
                    { "ilev": 0, "ncomplex": "1*2", "j": 0, "energy": -13.0 },
                    { "ilev": 1, "ncomplex": "1*1 2*1", "j": 2, "energy": -10.0 }
                ] }
            ]
        }),
    );
    write_json(
        &he.rate_file(RateKind::Excitation),
        json!({ "blocks": [ { "nele": 2, "transitions": [
            { "lower": 0, "upper": 1, "params": [0.02] }
        ] } ] }),
    );
    write_json(
        &he.rate_file(RateKind::Radiative),
        json!({ "blocks": [ { "nele": 2, "multipole": -1, "transitions": [
            { "lower": 0, "upper": 1, "params": [0.3] }
        ] } ] }),
    );

    write_json(
        &li.energy_file(),
        json!({
            "atom": 6,
            "symbol": "C",
            "blocks": [
                { "nele": 2, "levels": [
                    { "ilev": 0, "ncomplex": "1*2", "j": 0, "energy": -1.0 },
                    { "ilev": 1, "ncomplex": "1*1 2*1", "j": 2, "energy": 2.0 }
                ] },
                { "nele": 3, "levels": [
                    { "ilev": 2, "ncomplex": "1*2 2*1", "j": 1, "energy": -3.0 },
                    { "ilev": 3, "ncomplex": "1*2 3*1", "j": 1, "energy": -2.0 }
                ] }
            ]
        }),
    );
    write_json(
        &li.rate_file(RateKind::Excitation),
        json!({ "blocks": [ { "nele": 3, "transitions": [
            { "lower": 2, "upper": 3, "params": [0.05] }
        ] } ] }),
    );
    write_json(
        &li.rate_file(RateKind::Radiative),
        json!({ "blocks": [ { "nele": 3, "transitions": [
            { "lower": 2, "upper": 3, "params": [0.1] }
        ] } ] }),
    );

    (he, li)
}

fn two_stage_state(root: &Path, config: KineticsConfig) -> KineticsState {
    let (he, li) = two_stage_database(root);
    let mut state = KineticsState::new(config);
    state.add_ion(2, Some(1.0), he);
    state.add_ion(3, Some(0.0), li);
    state.build_blocks(None, None).expect("blocks should build");
    state
}

fn stage_total(state: &KineticsState, stage: StageId) -> f64 {
    state
        .blocks
        .iter()
        .filter(|block| block.stage == stage)
        .map(|block| block.nb)
        .sum()
}

#[test]
fn two_stage_round_trip_converges_to_pinned_abundances() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mut config = KineticsConfig::default();
    config.set_electron_density(100.0);
    let mut state = two_stage_state(temp.path(), config);
    let kernels = MaxwellianKernels::new(200.0).expect("kernels");

    let summary = state
        .solve_steady_state(&kernels, &EquilibratedLu)
        .expect("run should succeed");

    assert!(summary.populate.converged);
    assert!(summary.populate.iterations <= state.config.max_iter);
    assert!(summary.populate.metric < state.config.iter_accuracy);
    assert!((stage_total(&state, StageId::Ion(0)) - 1.0).abs() < 1.0e-10);
    assert_eq!(stage_total(&state, StageId::Ion(1)), 0.0);

    let he = &state.ions[0];
    let excited = &state.blocks[he.levels[1].block];
    assert!(excited.nb > 0.0 && excited.nb < 1.0);

    let report = PopulationReport::from_state(&state, Some(summary));
    let stage = report.stage(StageId::Ion(0)).expect("first stage");
    assert_eq!(stage.blocks.len(), 2);
    assert!((stage.population - 1.0).abs() < 1.0e-10);
    assert!(report.stage(StageId::Parent).is_none());
}

#[test]
fn assembled_transfer_rows_sum_to_zero() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mut config = KineticsConfig::default();
    config.set_electron_density(10.0);
    config.set_photon_density(1.0e-3);
    let mut state = two_stage_state(temp.path(), config);
    let kernels = MaxwellianKernels::new(80.0).expect("kernels");
    state.load_all_rates(&kernels).expect("rates should load");
    state.init_blocks();

    let matrix = state.assemble_block_matrix().expect("matrix");
    let dimension = matrix.dimension();
    for row in matrix.retained_rows() {
        let sum: f64 = (0..dimension).map(|col| matrix.transfer[(row, col)]).sum();
        let scale: f64 = (0..dimension)
            .map(|col| matrix.transfer[(row, col)].abs())
            .fold(1.0, f64::max);
        assert!(sum.abs() <= 1.0e-12 * scale, "row {row} sums to {sum}");
    }
}

#[test]
fn every_level_belongs_to_exactly_one_block_slot() {
    let temp = TempDir::new().expect("tempdir should be created");
    let state = two_stage_state(temp.path(), KineticsConfig::default());

    for (index, ion) in state.ions.iter().enumerate() {
        let mut seen = HashSet::new();
        for level in &ion.levels {
            assert!(level.slot < state.blocks[level.block].level_count());
            assert!(seen.insert((level.block, level.slot)));
        }
        for block in state.blocks.iter().filter(|block| block.stage == StageId::Ion(index)) {
            let members = ion
                .levels
                .iter()
                .filter(|level| level.block == block.index)
                .count();
            assert_eq!(members, block.level_count());
        }
    }

    // Li-like ionized levels reuse the He-like blocks.
    assert_eq!(state.ions[1].levels[0].block, state.ions[0].levels[0].block);
    assert_eq!(state.ions[1].levels[1].block, state.ions[0].levels[1].block);
}

#[test]
fn populate_on_a_converged_state_is_stable() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mut config = KineticsConfig::default();
    config.set_cascade(false, 0.0);
    config.set_electron_density(100.0);
    let mut state = two_stage_state(temp.path(), config);
    let kernels = MaxwellianKernels::new(200.0).expect("kernels");
    let first = state
        .solve_steady_state(&kernels, &EquilibratedLu)
        .expect("run should succeed");
    assert!(first.cascade.is_none());

    let populations = state.blocks.iter().map(|block| block.nb).collect::<Vec<_>>();
    let again = state.populate(&EquilibratedLu).expect("rerun should succeed");
    assert_eq!(again.iterations, 1);
    assert!(again.metric < state.config.iter_accuracy);
    for (block, before) in state.blocks.iter().zip(populations) {
        assert!((block.nb - before).abs() <= 1.0e-9 * before.abs().max(1.0));
    }
}

/// He-like carbon with three levels linked by excitation and decay.
fn three_level_database(root: &Path) -> DatabasePrefix {
    let he = DatabasePrefix::new(root.join("c5-three"));
    write_json(
        &he.energy_file(),
        json!({
            "atom": 6,
            "symbol": "C",
            "blocks": [
                { "nele": 2, "levels": [
                    { "ilev": 0, "ncomplex": "1*2", "j": 0, "energy": -13.0 },
                    { "ilev": 1, "ncomplex": "1*1 2*1", "j": 2, "energy": -10.0 },
                    { "ilev": 2, "ncomplex": "1*1 2*1", "j": 0, "energy": -9.0 }
                ] }
            ]
        }),
    );
    write_json(
        &he.rate_file(RateKind::Excitation),
        json!({ "blocks": [ { "nele": 2, "transitions": [
            { "lower": 0, "upper": 1, "params": [0.02] },
            { "lower": 0, "upper": 2, "params": [0.01] },
            { "lower": 1, "upper": 2, "params": [0.05] }
        ] } ] }),
    );
    write_json(
        &he.rate_file(RateKind::Radiative),
        json!({ "blocks": [ { "nele": 2, "multipole": -1, "transitions": [
            { "lower": 0, "upper": 1, "params": [0.3] },
            { "lower": 0, "upper": 2, "params": [0.1] },
            { "lower": 1, "upper": 2, "params": [0.05] }
        ] } ] }),
    );
    he
}

#[test]
fn multi_block_stage_is_normalized_to_its_pinned_abundance() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mut config = KineticsConfig::default();
    config.set_electron_density(50.0);
    config.set_single_blocks(2);
    let mut state = KineticsState::new(config);
    state.add_ion(2, Some(1.0), three_level_database(temp.path()));
    state.build_blocks(None, None).expect("blocks should build");
    state
        .pin_abundances(&[AbundancePin {
            nele: 2,
            abundance: Some(0.25),
        }])
        .expect("stage should be pinned");
    assert_eq!(state.ions[0].abundance, Some(0.25));

    let kernels = MaxwellianKernels::new(150.0).expect("kernels");
    state.load_all_rates(&kernels).expect("rates should load");
    state.init_blocks();
    let report = state.populate(&EquilibratedLu).expect("populate should succeed");
    assert!(report.iterations >= 1);

    let run = state
        .stage_runs()
        .into_iter()
        .find(|(stage, _)| *stage == StageId::Ion(0))
        .map(|(_, run)| run)
        .expect("ion run");
    assert_eq!(run.len(), 3);
    let matrix = state.block_matrix().expect("matrix should be assembled");
    assert_eq!(matrix.rhs[run.start], 0.25);
    assert!(run.clone().skip(1).all(|row| matrix.rhs[row] == 0.0));

    assert!(state.blocks[run.clone()].iter().all(|block| block.nb > 0.0));
    assert!((stage_total(&state, StageId::Ion(0)) - 0.25).abs() < 1.0e-10);
}

#[test]
fn coupling_the_parent_after_building_is_refused() {
    let temp = TempDir::new().expect("tempdir should be created");
    let mut state = KineticsState::new(KineticsConfig::default());
    state.add_ion(2, Some(1.0), three_level_database(temp.path()));
    state.build_blocks(None, None).expect("blocks should build");

    let error = state
        .pin_abundances(&[AbundancePin {
            nele: 1,
            abundance: Some(0.1),
        }])
        .expect_err("parent was built decoupled");
    assert_eq!(error.placeholder(), "INPUT.PARENT_COUPLING");

    let error = state
        .pin_abundances(&[AbundancePin {
            nele: 9,
            abundance: None,
        }])
        .expect_err("no such stage");
    assert_eq!(error.placeholder(), "INPUT.UNKNOWN_STAGE");
}
