pub mod cleanup;
pub mod epi;

pub use cleanup::cleanup_edge_pipeline;
pub use epi::{ecc_pipeline, hmc_pipeline, sdc_fmb, EccParams, HmcParams, SdcParams};

use crate::core::workflow::Workflow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 可由 CLI 選擇的 workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineKind {
    Hmc,
    Ecc,
    Sdc,
    Cleanup,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 4] = [
        PipelineKind::Hmc,
        PipelineKind::Ecc,
        PipelineKind::Sdc,
        PipelineKind::Cleanup,
    ];
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineKind::Hmc => "hmc",
            PipelineKind::Ecc => "ecc",
            PipelineKind::Sdc => "sdc",
            PipelineKind::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

impl FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PipelineKind::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown pipeline '{}' (expected hmc, ecc, sdc or cleanup)", s))
    }
}

/// 各 workflow 的參數集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub hmc: HmcParams,
    pub ecc: EccParams,
    pub sdc: SdcParams,
}

pub fn build(kind: PipelineKind, params: &PipelineParams) -> Workflow {
    tracing::debug!("🏗️ Building {} workflow", kind);
    match kind {
        PipelineKind::Hmc => hmc_pipeline(&params.hmc),
        PipelineKind::Ecc => ecc_pipeline(&params.ecc),
        PipelineKind::Sdc => sdc_fmb(&params.sdc),
        PipelineKind::Cleanup => cleanup_edge_pipeline("Cleanup"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("HMC".parse::<PipelineKind>().unwrap(), PipelineKind::Hmc);
        assert_eq!("cleanup".parse::<PipelineKind>().unwrap(), PipelineKind::Cleanup);
        assert!("topup".parse::<PipelineKind>().is_err());
    }

    #[test]
    fn test_default_workflow_names() {
        let params = PipelineParams::default();
        let names: Vec<String> = PipelineKind::ALL
            .into_iter()
            .map(|kind| build(kind, &params).name().to_string())
            .collect();
        assert_eq!(names, vec!["motion_correct", "eddy_correct", "fmb_correction", "Cleanup"]);
    }
}
