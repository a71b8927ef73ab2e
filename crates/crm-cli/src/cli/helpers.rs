use super::CliError;
use anyhow::Context;
use crm_core::kinetics::ConvergenceReport;
use crm_core::report::PopulationReport;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Events go to stderr; `RUST_LOG` overrides the default `info` level.
pub(super) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(super) fn ensure_parent_dir(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("failed to create report directory '{}'", parent.display())
        })?;
    }
    Ok(())
}

pub(super) fn render_summary(report: &PopulationReport) -> String {
    let mut rendered = String::new();
    let _ = writeln!(
        rendered,
        "{} (Z={}) ne={:.4e} photons={:.4e}",
        report.symbol, report.atom, report.electron_density, report.photon_density
    );
    for stage in &report.stages {
        let _ = writeln!(
            rendered,
            "  {:<8} nele={:<3} population={:.6e} blocks={}",
            stage.stage.to_string(),
            stage.nele,
            stage.population,
            stage.blocks.len()
        );
    }
    if let Some(populate) = &report.populate {
        let _ = writeln!(rendered, "{}", convergence_line("populate", populate));
    }
    if let Some(cascade) = &report.cascade {
        let _ = writeln!(rendered, "{}", convergence_line("cascade", cascade));
    }
    rendered
}

fn convergence_line(label: &str, report: &ConvergenceReport) -> String {
    format!(
        "{label}: {} after {} iterations (metric {:.4e})",
        if report.converged {
            "converged"
        } else {
            "not converged"
        },
        report.iterations,
        report.metric
    )
}
