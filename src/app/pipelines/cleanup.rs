use crate::core::workflow::{Node, Workflow};
use crate::interfaces::fsl;
use crate::interfaces::utility::{IdentityInterface, Merge};

/// 場圖邊緣清理：只對遮罩邊緣做 despike，內部保持原值
///
/// Inputs: `inputnode.in_file` (field map), `inputnode.in_mask`.
/// Output: `outputnode.out_file`.
pub fn cleanup_edge_pipeline(name: &str) -> Workflow {
    let inputnode = IdentityInterface::new(&["in_file", "in_mask"]);
    let fugue = fsl::fugue()
        .with("save_fmap", true)
        .with("despike_2dfilter", true)
        .with("despike_threshold", 2.1);
    let erode = fsl::maths_command()
        .with("nan2zeros", true)
        .with("args", "-kernel 2D -ero");
    let newmsk = fsl::multi_image_maths().with("op_string", "-sub %s -thr 0.5 -bin");
    let applymsk = fsl::apply_mask().with("nan2zeros", true);
    let join = Merge::new(2);
    let addedge = fsl::multi_image_maths().with("op_string", "-mas %s -add %s");
    let outputnode = IdentityInterface::new(&["out_file"]);

    let mut wf = Workflow::new(name);
    wf.add_node(Node::new("inputnode", inputnode));
    wf.add_node(Node::new("Despike", fugue));
    wf.add_node(Node::new("MskErode", erode));
    wf.add_node(Node::new("MskDiff", newmsk));
    wf.add_node(Node::new("ApplyMsk", applymsk));
    wf.add_node(Node::new("Merge", join));
    wf.add_node(Node::new("AddEdge", addedge));
    wf.add_node(Node::new("outputnode", outputnode));

    wf.connect("inputnode", "Despike", &[("in_file", "fmap_in_file"), ("in_mask", "mask_file")]);
    wf.connect("inputnode", "MskErode", &[("in_mask", "in_file")]);
    wf.connect("inputnode", "MskDiff", &[("in_mask", "in_file")]);
    wf.connect("MskErode", "MskDiff", &[("out_file", "operand_files")]);
    wf.connect("Despike", "ApplyMsk", &[("fmap_out_file", "in_file")]);
    wf.connect("MskDiff", "ApplyMsk", &[("out_file", "mask_file")]);
    wf.connect("MskErode", "Merge", &[("out_file", "in1")]);
    wf.connect("ApplyMsk", "Merge", &[("out_file", "in2")]);
    wf.connect("inputnode", "AddEdge", &[("in_file", "in_file")]);
    wf.connect("Merge", "AddEdge", &[("out", "operand_files")]);
    wf.connect("AddEdge", "outputnode", &[("out_file", "out_file")]);
    wf
}
