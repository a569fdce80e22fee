pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod interfaces;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;

pub use crate::app::pipelines::{
    cleanup_edge_pipeline, ecc_pipeline, hmc_pipeline, sdc_fmb, EccParams, HmcParams, PipelineKind, SdcParams,
};
pub use crate::config::PrepConfig;
pub use crate::core::workflow::{Connector, Node, Workflow};
pub use crate::domain::model::FieldValue;
pub use crate::domain::ports::Interface;
pub use crate::interfaces::minc::Gennlxfm;
pub use crate::utils::error::{PrepError, Result};
