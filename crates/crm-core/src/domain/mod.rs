pub mod errors;

pub use errors::{CrmError, CrmErrorCategory, CrmResult, LoadResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One of the five per-ion rate buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateKind {
    Excitation,
    Radiative,
    Ionization,
    Recombination,
    Autoionization,
}

impl RateKind {
    pub const ALL: [RateKind; 5] = [
        Self::Excitation,
        Self::Radiative,
        Self::Recombination,
        Self::Autoionization,
        Self::Ionization,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Excitation => "CE",
            Self::Radiative => "TR",
            Self::Ionization => "CI",
            Self::Recombination => "RR",
            Self::Autoionization => "AI",
        }
    }

    /// Database file extension holding records of this kind.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Excitation => "ce",
            Self::Radiative => "tr",
            Self::Ionization => "ci",
            Self::Recombination => "rr",
            Self::Autoionization => "ai",
        }
    }

    /// Whether the kind needs the ionised parent stage to be meaningful.
    pub const fn couples_stages(self) -> bool {
        matches!(
            self,
            Self::Ionization | Self::Recombination | Self::Autoionization
        )
    }
}

impl Display for RateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Owner of a block: a configured ion, or the ionised parent continuum that
/// sits below the first ion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum StageId {
    Parent,
    Ion(usize),
}

impl StageId {
    pub const fn ion_index(self) -> Option<usize> {
        match self {
            Self::Parent => None,
            Self::Ion(index) => Some(index),
        }
    }

    /// Ion whose level table hosts the stage; the parent lives in ion 0.
    pub const fn host_ion(self) -> usize {
        match self {
            Self::Parent => 0,
            Self::Ion(index) => index,
        }
    }
}

impl Display for StageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parent => f.write_str("parent"),
            Self::Ion(index) => write!(f, "ion#{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{RateKind, StageId};

    #[test]
    fn rate_kind_labels_and_extensions_are_stable() {
        let labels = RateKind::ALL
            .iter()
            .map(|kind| (kind.to_string(), kind.extension()))
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec![
                ("CE".to_string(), "ce"),
                ("TR".to_string(), "tr"),
                ("RR".to_string(), "rr"),
                ("AI".to_string(), "ai"),
                ("CI".to_string(), "ci"),
            ]
        );
        assert!(RateKind::Recombination.couples_stages());
        assert!(!RateKind::Radiative.couples_stages());
    }

    #[test]
    fn parent_stage_is_hosted_by_first_ion() {
        assert_eq!(StageId::Parent.host_ion(), 0);
        assert_eq!(StageId::Ion(3).host_ion(), 3);
        assert_eq!(StageId::Parent.ion_index(), None);
        assert!(StageId::Parent < StageId::Ion(0));
        assert_eq!(StageId::Ion(1).to_string(), "ion#1");
    }
}
