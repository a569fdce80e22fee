use dmri_prep::app::pipelines::{build, PipelineKind, PipelineParams};
use dmri_prep::{
    cleanup_edge_pipeline, ecc_pipeline, hmc_pipeline, sdc_fmb, Connector, EccParams, HmcParams, SdcParams,
};

fn position(plan: &[String], name: &str) -> usize {
    plan.iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{} is not in the plan {:?}", name, plan))
}

#[test]
fn test_all_workflows_validate() {
    let params = PipelineParams::default();
    for kind in PipelineKind::ALL {
        let workflow = build(kind, &params);
        workflow
            .validate()
            .unwrap_or_else(|e| panic!("{} failed validation: {}", kind, e));
    }
}

#[test]
fn test_hmc_plan_order() {
    let plan = hmc_pipeline(&HmcParams::default()).execution_plan().unwrap();
    assert_eq!(
        plan,
        vec![
            "motion_correct.inputnode",
            "motion_correct.SplitDWIs",
            "motion_correct.Pick_b0",
            "motion_correct.CoRegistration",
            "motion_correct.Rotate_Bvec",
            "motion_correct.MergeDWIs",
            "motion_correct.outputnode",
        ]
    );
}

#[test]
fn test_hmc_connections() {
    let wf = hmc_pipeline(&HmcParams::default());
    let pick = wf
        .connections()
        .iter()
        .find(|c| c.dest == "Pick_b0" && c.dest_field == "index")
        .unwrap();
    assert_eq!(pick.source, "inputnode");
    assert_eq!(pick.source_field, "ref_num");
    assert_eq!(pick.connector, Some(Connector::CheckRefNum));

    assert!(wf
        .connections()
        .iter()
        .any(|c| c.source == "CoRegistration" && c.source_field == "out_matrix_file" && c.dest == "outputnode"));
}

#[test]
fn test_ecc_dependencies() {
    let wf = ecc_pipeline(&EccParams::default());
    let plan = wf.execution_plan().unwrap();
    assert_eq!(plan.len(), 11);

    let at = |name: &str| position(&plan, &format!("eddy_correct.{}", name));
    assert!(at("InitXforms") < at("CoRegistration"));
    assert!(at("b0_avg") < at("CoRegistration"));
    assert!(at("CoRegistration") < at("ModulateDWIs"));
    assert!(at("ModulateDWIs") < at("RemoveNegative"));
    assert!(at("RemoveNegative") < at("MergeDWIs"));
    assert!(at("GatherMatrices") < at("outputnode"));

    let flirt = wf.node("CoRegistration").unwrap();
    assert_eq!(flirt.iterfield(), ["in_file".to_string(), "in_matrix_file".to_string()]);

    let jacobian = wf
        .connections()
        .iter()
        .find(|c| c.connector == Some(Connector::XfmJacobian))
        .unwrap();
    assert_eq!(jacobian.dest, "ModulateDWIs");
    assert_eq!(jacobian.dest_field, "operand_value");
}

#[test]
fn test_sdc_nests_cleanup() {
    let wf = sdc_fmb(&SdcParams::default());
    let plan = wf.execution_plan().unwrap();

    let at = |name: &str| position(&plan, &format!("fmb_correction.{}", name));
    assert!(at("GetFirst") < at("Bias"));
    assert!(at("Bias") < at("BrainExtraction"));
    assert!(at("MskDilate") < at("PhaseUnwrap"));
    assert!(at("PhaseUnwrap") < at("ToRadSec"));
    assert!(at("BmapMag2B0") < at("BmapPha2B0"));
    assert!(at("PreliminaryFugue") < at("DemeanFmap"));
    assert!(at("DemeanFmap") < at("Cleanup.inputnode"));
    assert!(at("Cleanup.Despike") < at("Cleanup.ApplyMsk"));
    assert!(at("Cleanup.AddEdge") < at("outputnode"));
}

#[test]
fn test_renamed_workflow() {
    let params = SdcParams {
        name: "fieldmap".to_string(),
        ..Default::default()
    };
    let plan = sdc_fmb(&params).execution_plan().unwrap();
    assert!(plan.iter().all(|n| n.starts_with("fieldmap.")));
    assert!(plan.contains(&"fieldmap.Cleanup.MskDiff".to_string()));
}

#[test]
fn test_miswired_workflow_is_rejected() {
    let mut wf = cleanup_edge_pipeline("Cleanup");
    wf.connect("MskErode", "AddEdge", &[("out_file", "in_file")]);
    assert!(wf.validate().is_err());

    let mut wf = cleanup_edge_pipeline("Cleanup");
    wf.connect("outputnode", "inputnode", &[("out_file", "in_file")]);
    assert!(wf.validate().is_err());

    let mut wf = hmc_pipeline(&HmcParams::default());
    wf.connect("SplitDWIs", "MergeDWIs", &[("out_files", "merged_files")]);
    assert!(wf.validate().is_err());
}

#[test]
fn test_describe_outputs() {
    let wf = ecc_pipeline(&EccParams::default());
    let dot = wf.to_dot().unwrap();
    assert!(dot.contains("\"eddy_correct.Pick_DWIs\" -> \"eddy_correct.CoRegistration\" [label=\"out->in_file\"];"));
    assert!(dot.contains("out_matrix_file->operand_value [_xfm_jacobian]"));
    assert!(dot.contains("\"eddy_correct.b0_avg\" [label=\"b0_avg\\n(Function: b0_average)\", shape=box];"));

    let summary = wf.summary().unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    let split = json["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["name"] == "eddy_correct.SplitDWIs")
        .unwrap();
    assert_eq!(split["interface"], "Split");
    assert_eq!(split["kind"], "command");

    let helpers: Vec<(String, String)> = json["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| Some((n["name"].as_str()?.to_string(), n["helper"].as_str()?.to_string())))
        .collect();
    assert_eq!(
        helpers,
        vec![
            ("eddy_correct.b0_avg".to_string(), "b0_average".to_string()),
            ("eddy_correct.InitXforms".to_string(), "check_init_xfms".to_string()),
            ("eddy_correct.GatherMatrices".to_string(), "recompose_xfm".to_string()),
            ("eddy_correct.MergeDWIs".to_string(), "recompose_dwi".to_string()),
        ]
    );
}

#[test]
fn test_every_helper_is_wired_somewhere() {
    let params = PipelineParams::default();
    let mut used: Vec<String> = PipelineKind::ALL
        .into_iter()
        .flat_map(|kind| build(kind, &params).summary().unwrap().nodes)
        .filter_map(|node| node.helper)
        .collect();
    used.sort();
    used.dedup();
    assert_eq!(
        used,
        vec![
            "b0_average",
            "check_init_xfms",
            "demean_image",
            "rads2radsec",
            "recompose_dwi",
            "recompose_xfm",
            "rotate_bvecs",
            "siemens2rads",
        ]
    );
}
