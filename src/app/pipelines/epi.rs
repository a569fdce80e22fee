//! 頭動校正、渦電流校正與場圖扭曲校正的 workflow

use crate::app::pipelines::cleanup::cleanup_edge_pipeline;
use crate::core::workflow::{Connector, Node, Workflow};
use crate::interfaces::utility::{Function, Helper, IdentityInterface, Select};
use crate::interfaces::{ants, fsl};
use crate::utils::error::{PrepError, Result};
use crate::utils::validation::{validate_identifier, validate_positive_number, validate_range, Validate};
use serde::{Deserialize, Serialize};

fn validate_search_range(field: &str, range: [i64; 2]) -> Result<()> {
    validate_range(&format!("{}[0]", field), range[0], -180, 0)?;
    validate_range(&format!("{}[1]", field), range[1], 0, 180)
}

/// `[hmc]` 區段：頭動校正參數
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmcParams {
    pub name: String,
    pub dof: usize,
    pub bins: usize,
    pub cost: String,
    pub interp: String,
    /// 各軸的旋轉搜尋範圍（度）
    pub search_range: [i64; 2],
    pub fine_search: usize,
    pub coarse_search: usize,
    pub padding_size: usize,
}

impl Default for HmcParams {
    fn default() -> Self {
        Self {
            name: "motion_correct".to_string(),
            dof: 6,
            bins: 64,
            cost: "normmi".to_string(),
            interp: "spline".to_string(),
            search_range: [-4, 4],
            fine_search: 1,
            coarse_search: 10,
            padding_size: 1,
        }
    }
}

impl Validate for HmcParams {
    fn validate(&self) -> Result<()> {
        validate_identifier("hmc.name", &self.name)?;
        validate_positive_number("hmc.dof", self.dof, 1)?;
        validate_positive_number("hmc.bins", self.bins, 1)?;
        validate_positive_number("hmc.fine_search", self.fine_search, 1)?;
        validate_positive_number("hmc.coarse_search", self.coarse_search, 1)?;
        validate_search_range("hmc.search_range", self.search_range)
    }
}

/// `[ecc]` 區段：渦電流校正參數
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EccParams {
    pub name: String,
    pub dof: usize,
    pub bins: usize,
    pub cost: String,
    pub interp: String,
    pub padding_size: usize,
}

impl Default for EccParams {
    fn default() -> Self {
        Self {
            name: "eddy_correct".to_string(),
            dof: 12,
            bins: 64,
            cost: "normmi".to_string(),
            interp: "spline".to_string(),
            padding_size: 1,
        }
    }
}

impl Validate for EccParams {
    fn validate(&self) -> Result<()> {
        validate_identifier("ecc.name", &self.name)?;
        validate_positive_number("ecc.dof", self.dof, 1)?;
        validate_positive_number("ecc.bins", self.bins, 1)
    }
}

/// `[sdc]` 區段：場圖扭曲校正參數
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdcParams {
    pub name: String,
    /// 兩個回波時間差（秒）
    pub delta_te: f64,
    pub bet_frac: f64,
    pub dof: usize,
    pub bins: usize,
    pub search_range: [i64; 2],
    pub padding_size: usize,
}

impl Default for SdcParams {
    fn default() -> Self {
        Self {
            name: "fmb_correction".to_string(),
            delta_te: 2.46e-3,
            bet_frac: 0.4,
            dof: 6,
            bins: 64,
            search_range: [-4, 4],
            padding_size: 10,
        }
    }
}

impl Validate for SdcParams {
    fn validate(&self) -> Result<()> {
        validate_identifier("sdc.name", &self.name)?;
        if self.delta_te.is_nan() || self.delta_te <= 0.0 {
            return Err(PrepError::InvalidConfigValueError {
                field: "sdc.delta_te".to_string(),
                value: self.delta_te.to_string(),
                reason: "echo time difference must be positive".to_string(),
            });
        }
        validate_range("sdc.bet_frac", self.bet_frac, 0.0, 1.0)?;
        validate_positive_number("sdc.dof", self.dof, 1)?;
        validate_positive_number("sdc.bins", self.bins, 1)?;
        validate_search_range("sdc.search_range", self.search_range)
    }
}

/// 頭動校正：每個 volume 以 FLIRT 剛體配準到參考 b0，並旋轉 b-vectors
///
/// Inputs: `inputnode.in_file`, `inputnode.ref_num`, `inputnode.in_bvec`,
/// `inputnode.in_mask`. Outputs: `outputnode.out_file`,
/// `outputnode.out_bvec`, `outputnode.out_xfms`.
pub fn hmc_pipeline(params: &HmcParams) -> Workflow {
    let search = vec![params.search_range[0], params.search_range[1]];

    let inputnode = IdentityInterface::new(&["in_file", "ref_num", "in_bvec", "in_mask"]);
    let split = fsl::split().with("dimension", "t");
    let pick_ref = Select::new();
    let flirt = fsl::flirt()
        .with("interp", params.interp.as_str())
        .with("cost", params.cost.as_str())
        .with("cost_func", params.cost.as_str())
        .with("dof", params.dof)
        .with("bins", params.bins)
        .with("save_log", true)
        .with("searchr_x", search.clone())
        .with("searchr_y", search.clone())
        .with("searchr_z", search)
        .with("fine_search", params.fine_search)
        .with("coarse_search", params.coarse_search)
        .with("padding_size", params.padding_size);
    let rot_bvec = Function::from_helper(Helper::RotateBvecs);
    let merge = fsl::merge().with("dimension", "t");
    let outputnode = IdentityInterface::new(&["out_file", "out_bvec", "out_xfms"]);

    let mut wf = Workflow::new(&params.name);
    wf.add_node(Node::new("inputnode", inputnode));
    wf.add_node(Node::new("SplitDWIs", split));
    wf.add_node(Node::new("Pick_b0", pick_ref));
    wf.add_node(Node::map("CoRegistration", flirt, &["in_file"]));
    wf.add_node(Node::new("Rotate_Bvec", rot_bvec));
    wf.add_node(Node::new("MergeDWIs", merge));
    wf.add_node(Node::new("outputnode", outputnode));

    wf.connect("inputnode", "SplitDWIs", &[("in_file", "in_file")]);
    wf.connect("SplitDWIs", "Pick_b0", &[("out_files", "inlist")]);
    wf.connect_with("inputnode", "ref_num", Connector::CheckRefNum, "Pick_b0", "index");
    wf.connect("inputnode", "CoRegistration", &[("in_mask", "ref_weight")]);
    wf.connect("SplitDWIs", "CoRegistration", &[("out_files", "in_file")]);
    wf.connect("inputnode", "Rotate_Bvec", &[("in_bvec", "in_bvec")]);
    wf.connect("CoRegistration", "Rotate_Bvec", &[("out_matrix_file", "in_matrix")]);
    wf.connect("Pick_b0", "CoRegistration", &[("out", "reference")]);
    wf.connect("CoRegistration", "MergeDWIs", &[("out_file", "in_files")]);
    wf.connect("MergeDWIs", "outputnode", &[("merged_file", "out_file")]);
    wf.connect("Rotate_Bvec", "outputnode", &[("out_file", "out_bvec")]);
    wf.connect("CoRegistration", "outputnode", &[("out_matrix_file", "out_xfms")]);
    wf
}

/// 渦電流校正：DWI 以仿射 FLIRT 配準到平均 b0，並以 Jacobian 調整強度
///
/// Inputs: `inputnode.in_file`, `inputnode.in_bval`, `inputnode.in_mask`,
/// `inputnode.in_xfms` (optional head-motion matrices). Outputs:
/// `outputnode.out_file`, `outputnode.out_xfms`.
pub fn ecc_pipeline(params: &EccParams) -> Workflow {
    let inputnode = IdentityInterface::new(&["in_file", "in_bval", "in_mask", "in_xfms"]);
    let split = fsl::split().with("dimension", "t");
    let avg_b0 = Function::from_helper(Helper::B0Average);
    let pick_dwi = Select::new();
    let flirt = fsl::flirt()
        .with("no_search", true)
        .with("interp", params.interp.as_str())
        .with("cost", params.cost.as_str())
        .with("cost_func", params.cost.as_str())
        .with("dof", params.dof)
        .with("bins", params.bins)
        .with("save_log", true)
        .with("padding_size", params.padding_size);
    let initmat = Function::from_helper(Helper::CheckInitXfms);
    let mult = fsl::binary_maths().with("operation", "mul");
    let thres = fsl::threshold().with("thresh", 0.0);
    let get_mat = Function::from_helper(Helper::RecomposeXfm);
    let merge = Function::from_helper(Helper::RecomposeDwi);
    let outputnode = IdentityInterface::new(&["out_file", "out_xfms"]);

    let mut wf = Workflow::new(&params.name);
    wf.add_node(Node::new("inputnode", inputnode));
    wf.add_node(Node::new("SplitDWIs", split));
    wf.add_node(Node::new("b0_avg", avg_b0));
    wf.add_node(Node::new("Pick_DWIs", pick_dwi));
    wf.add_node(Node::map("CoRegistration", flirt, &["in_file", "in_matrix_file"]));
    wf.add_node(Node::new("InitXforms", initmat));
    wf.add_node(Node::map("ModulateDWIs", mult, &["in_file", "operand_value"]));
    wf.add_node(Node::map("RemoveNegative", thres, &["in_file"]));
    wf.add_node(Node::new("GatherMatrices", get_mat));
    wf.add_node(Node::new("MergeDWIs", merge));
    wf.add_node(Node::new("outputnode", outputnode));

    wf.connect("inputnode", "SplitDWIs", &[("in_file", "in_file")]);
    wf.connect("inputnode", "b0_avg", &[("in_file", "in_dwi"), ("in_bval", "in_bval")]);
    wf.connect("inputnode", "MergeDWIs", &[("in_file", "in_dwi"), ("in_bval", "in_bval")]);
    wf.connect("inputnode", "InitXforms", &[("in_xfms", "in_xfms"), ("in_bval", "in_bval")]);
    wf.connect("inputnode", "GatherMatrices", &[("in_bval", "in_bval")]);
    wf.connect("SplitDWIs", "Pick_DWIs", &[("out_files", "inlist")]);
    wf.connect_with("inputnode", "in_bval", Connector::NonB0, "Pick_DWIs", "index");
    wf.connect("inputnode", "CoRegistration", &[("in_mask", "ref_weight")]);
    wf.connect("b0_avg", "CoRegistration", &[("out_file", "reference")]);
    wf.connect("Pick_DWIs", "CoRegistration", &[("out", "in_file")]);
    wf.connect("InitXforms", "CoRegistration", &[("init_xfms", "in_matrix_file")]);
    wf.connect("CoRegistration", "GatherMatrices", &[("out_matrix_file", "in_xfms")]);
    wf.connect_with(
        "CoRegistration",
        "out_matrix_file",
        Connector::XfmJacobian,
        "ModulateDWIs",
        "operand_value",
    );
    wf.connect("CoRegistration", "ModulateDWIs", &[("out_file", "in_file")]);
    wf.connect("ModulateDWIs", "RemoveNegative", &[("out_file", "in_file")]);
    wf.connect("RemoveNegative", "MergeDWIs", &[("out_file", "in_corrected")]);
    wf.connect("GatherMatrices", "outputnode", &[("out_files", "out_xfms")]);
    wf.connect("MergeDWIs", "outputnode", &[("out_file", "out_file")]);
    wf
}

/// 以 Siemens 雙回波場圖做磁化率扭曲校正
///
/// Inputs: `inputnode.in_file`, `inputnode.in_bval`, `inputnode.in_mask`,
/// `inputnode.bmap_pha`, `inputnode.bmap_mag`. Output: `outputnode.out_file`,
/// the demeaned and edge-cleaned field map in rad/s aligned to the b0.
pub fn sdc_fmb(params: &SdcParams) -> Workflow {
    let search = vec![params.search_range[0], params.search_range[1]];

    let inputnode = IdentityInterface::new(&["in_file", "in_bval", "in_mask", "bmap_pha", "bmap_mag"]);
    let firstmag = fsl::extract_roi().with("t_min", 0).with("t_size", 1);
    let n4 = ants::n4_bias_field_correction().with("dimension", 3);
    let bet = fsl::bet().with("frac", params.bet_frac).with("mask", true);
    let dilate = fsl::maths_command()
        .with("nan2zeros", true)
        .with("args", "-kernel sphere 5 -dilM");
    let pha2rads = Function::from_helper(Helper::Siemens2rads);
    let prelude = fsl::prelude().with("process3d", true);
    let rad2rsec = Function::from_helper(Helper::Rads2radsec).with("delta_te", params.delta_te);
    let avg_b0 = Function::from_helper(Helper::B0Average);
    let flirt = fsl::flirt()
        .with("interp", "spline")
        .with("cost", "normmi")
        .with("cost_func", "normmi")
        .with("dof", params.dof)
        .with("bins", params.bins)
        .with("save_log", true)
        .with("padding_size", params.padding_size)
        .with("searchr_x", search.clone())
        .with("searchr_y", search.clone())
        .with("searchr_z", search)
        .with("fine_search", 1)
        .with("coarse_search", 10);
    let applyxfm = fsl::apply_xfm()
        .with("interp", "spline")
        .with("padding_size", params.padding_size)
        .with("apply_xfm", true);
    let pre_fugue = fsl::fugue().with("save_fmap", true);
    let demean = Function::from_helper(Helper::DemeanImage);
    let outputnode = IdentityInterface::new(&["out_file"]);

    let mut wf = Workflow::new(&params.name);
    wf.add_node(Node::new("inputnode", inputnode));
    wf.add_node(Node::new("GetFirst", firstmag));
    wf.add_node(Node::new("Bias", n4));
    wf.add_node(Node::new("BrainExtraction", bet));
    wf.add_node(Node::new("MskDilate", dilate));
    wf.add_node(Node::new("PreparePhase", pha2rads));
    wf.add_node(Node::new("PhaseUnwrap", prelude));
    wf.add_node(Node::new("ToRadSec", rad2rsec));
    wf.add_node(Node::new("b0_avg", avg_b0));
    wf.add_node(Node::new("BmapMag2B0", flirt));
    wf.add_node(Node::new("BmapPha2B0", applyxfm));
    wf.add_node(Node::new("PreliminaryFugue", pre_fugue));
    wf.add_node(Node::new("DemeanFmap", demean));
    wf.add_workflow(cleanup_edge_pipeline("Cleanup"));
    wf.add_node(Node::new("outputnode", outputnode));

    wf.connect("inputnode", "PreparePhase", &[("bmap_pha", "in_file")]);
    wf.connect("inputnode", "GetFirst", &[("bmap_mag", "in_file")]);
    wf.connect("inputnode", "b0_avg", &[("in_file", "in_dwi"), ("in_bval", "in_bval")]);
    wf.connect("GetFirst", "Bias", &[("roi_file", "input_image")]);
    wf.connect("Bias", "BrainExtraction", &[("output_image", "in_file")]);
    wf.connect("BrainExtraction", "MskDilate", &[("mask_file", "in_file")]);
    wf.connect("PreparePhase", "PhaseUnwrap", &[("out_file", "phase_file")]);
    wf.connect("Bias", "PhaseUnwrap", &[("output_image", "magnitude_file")]);
    wf.connect("MskDilate", "PhaseUnwrap", &[("out_file", "mask_file")]);
    wf.connect("PhaseUnwrap", "ToRadSec", &[("unwrapped_phase_file", "in_file")]);

    wf.connect("b0_avg", "BmapMag2B0", &[("out_file", "reference")]);
    wf.connect("inputnode", "BmapMag2B0", &[("in_mask", "ref_weight")]);
    wf.connect("Bias", "BmapMag2B0", &[("output_image", "in_file")]);
    wf.connect("MskDilate", "BmapMag2B0", &[("out_file", "in_weight")]);

    wf.connect("b0_avg", "BmapPha2B0", &[("out_file", "reference")]);
    wf.connect("ToRadSec", "BmapPha2B0", &[("out_file", "in_file")]);
    wf.connect("BmapMag2B0", "BmapPha2B0", &[("out_matrix_file", "in_matrix_file")]);

    wf.connect("BmapPha2B0", "PreliminaryFugue", &[("out_file", "fmap_in_file")]);
    wf.connect("inputnode", "PreliminaryFugue", &[("in_mask", "mask_file")]);

    wf.connect("PreliminaryFugue", "DemeanFmap", &[("fmap_out_file", "in_file")]);
    wf.connect("inputnode", "DemeanFmap", &[("in_mask", "in_mask")]);

    wf.connect("DemeanFmap", "Cleanup", &[("out_file", "inputnode.in_file")]);
    wf.connect("inputnode", "Cleanup", &[("in_mask", "inputnode.in_mask")]);
    wf.connect("Cleanup", "outputnode", &[("outputnode.out_file", "out_file")]);
    wf
}
