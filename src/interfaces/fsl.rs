//! FSL 工具包裝
//!
//! Output images use the `.nii.gz` output type. Only the fields the dMRI
//! pipelines wire or preset are declared.

use crate::interfaces::command::{CommandLineTool, OutputRule};
use crate::interfaces::spec::{command_line_inputs, InterfaceSpec, TraitSpec};

fn from_input(field: &str) -> OutputRule {
    OutputRule::FromInput(field.to_string())
}

fn when(flag: &str, rule: OutputRule) -> OutputRule {
    OutputRule::When {
        flag: flag.to_string(),
        rule: Box::new(rule),
    }
}

/// `fslsplit`：沿某一維拆開 4D 影像
pub fn split() -> CommandLineTool {
    let inputs = command_line_inputs()
        .field(
            "in_file",
            TraitSpec::file().argstr("%s").position(0).mandatory().desc("input filename"),
        )
        .field(
            "out_base_name",
            TraitSpec::string().argstr("%s").position(1).desc("outputs prefix"),
        )
        .field(
            "dimension",
            TraitSpec::string()
                .argstr("-%s")
                .position(2)
                .mandatory()
                .desc("dimension along which the file will be split (t, x, y or z)"),
        );
    let outputs = InterfaceSpec::new().field("out_files", TraitSpec::list());
    CommandLineTool::new("Split", "fslsplit", inputs, outputs)
}

/// `fslmerge`：將多個影像沿某一維合併
pub fn merge() -> CommandLineTool {
    let inputs = command_line_inputs()
        .field(
            "dimension",
            TraitSpec::string()
                .argstr("-%s")
                .position(0)
                .mandatory()
                .desc("dimension along which to merge (t, x, y, z or a)"),
        )
        .field(
            "merged_file",
            TraitSpec::file()
                .argstr("%s")
                .position(1)
                .genfile()
                .hash_files(false)
                .name_source(&["in_files"])
                .name_template("%s_merged.nii.gz"),
        )
        .field(
            "in_files",
            TraitSpec::list().argstr("%s").position(2).mandatory(),
        )
        .field("tr", TraitSpec::float().argstr("%.2f").position(-1));
    let outputs = InterfaceSpec::new().field("merged_file", TraitSpec::file());
    CommandLineTool::new("Merge", "fslmerge", inputs, outputs)
        .output_rule("merged_file", from_input("merged_file"))
}

fn flirt_inputs() -> InterfaceSpec {
    command_line_inputs()
        .field(
            "in_file",
            TraitSpec::file().argstr("-in %s").position(0).mandatory().desc("input file"),
        )
        .field(
            "reference",
            TraitSpec::file().argstr("-ref %s").position(1).mandatory().desc("reference file"),
        )
        .field(
            "out_file",
            TraitSpec::file()
                .argstr("-out %s")
                .position(2)
                .genfile()
                .hash_files(false)
                .name_source(&["in_file"])
                .name_template("%s_flirt.nii.gz")
                .desc("registered output file"),
        )
        .field(
            "out_matrix_file",
            TraitSpec::file()
                .argstr("-omat %s")
                .position(3)
                .genfile()
                .hash_files(false)
                .name_source(&["in_file"])
                .name_template("%s_flirt.mat")
                .desc("output affine matrix in 4x4 ascii format"),
        )
        .field(
            "out_log",
            TraitSpec::file()
                .genfile()
                .name_source(&["in_file"])
                .name_template("%s_flirt.log")
                .requires(&["save_log"])
                .desc("output log"),
        )
        .field("in_matrix_file", TraitSpec::file().argstr("-init %s").desc("input 4x4 affine matrix"))
        .field("apply_xfm", TraitSpec::flag().argstr("-applyxfm").requires(&["in_matrix_file"]))
        .field("cost", TraitSpec::string().argstr("-cost %s"))
        .field("cost_func", TraitSpec::string().argstr("-searchcost %s"))
        .field("bins", TraitSpec::int().argstr("-bins %d"))
        .field("dof", TraitSpec::int().argstr("-dof %d"))
        .field("interp", TraitSpec::string().argstr("-interp %s"))
        .field("no_search", TraitSpec::flag().argstr("-nosearch"))
        .field("coarse_search", TraitSpec::int().argstr("-coarsesearch %d"))
        .field("fine_search", TraitSpec::int().argstr("-finesearch %d"))
        .field("searchr_x", TraitSpec::list().argstr("-searchrx %s"))
        .field("searchr_y", TraitSpec::list().argstr("-searchry %s"))
        .field("searchr_z", TraitSpec::list().argstr("-searchrz %s"))
        .field("ref_weight", TraitSpec::file().argstr("-refweight %s"))
        .field("in_weight", TraitSpec::file().argstr("-inweight %s"))
        .field("padding_size", TraitSpec::int().argstr("-paddingsize %d"))
        .field("save_log", TraitSpec::flag().desc("save to log file"))
}

fn flirt_outputs() -> InterfaceSpec {
    InterfaceSpec::new()
        .field("out_file", TraitSpec::file())
        .field("out_matrix_file", TraitSpec::file())
        .field("out_log", TraitSpec::file())
}

/// `flirt`：線性（剛體/仿射）配準
pub fn flirt() -> CommandLineTool {
    CommandLineTool::new("FLIRT", "flirt", flirt_inputs(), flirt_outputs())
        .generate_when("out_log", "save_log")
        .output_rule("out_file", from_input("out_file"))
        .output_rule("out_matrix_file", from_input("out_matrix_file"))
        .output_rule("out_log", when("save_log", from_input("out_log")))
}

/// 以既有矩陣重新取樣（`flirt -applyxfm`）
pub fn apply_xfm() -> CommandLineTool {
    let inputs = flirt_inputs()
        .field("apply_xfm", TraitSpec::flag().argstr("-applyxfm").usedefault(true))
        .field(
            "in_matrix_file",
            TraitSpec::file().argstr("-init %s").mandatory().desc("input 4x4 affine matrix"),
        );
    CommandLineTool::new("ApplyXfm", "flirt", inputs, flirt_outputs())
        .generate_when("out_log", "save_log")
        .output_rule("out_file", from_input("out_file"))
        .output_rule("out_matrix_file", from_input("out_matrix_file"))
        .output_rule("out_log", when("save_log", from_input("out_log")))
}

/// `fslroi`：擷取子區域或部分時間點
pub fn extract_roi() -> CommandLineTool {
    let mut inputs = command_line_inputs()
        .field(
            "in_file",
            TraitSpec::file().argstr("%s").position(0).mandatory().desc("input file"),
        )
        .field(
            "roi_file",
            TraitSpec::file()
                .argstr("%s")
                .position(1)
                .genfile()
                .hash_files(false)
                .name_source(&["in_file"])
                .name_template("%s_roi.nii.gz")
                .desc("output file"),
        );
    let positions = [
        "x_min", "x_size", "y_min", "y_size", "z_min", "z_size", "t_min", "t_size",
    ];
    for (offset, name) in positions.iter().enumerate() {
        inputs.insert(name, TraitSpec::int().argstr("%d").position(offset as i32 + 2));
    }
    let outputs = InterfaceSpec::new().field("roi_file", TraitSpec::file());
    CommandLineTool::new("ExtractROI", "fslroi", inputs, outputs)
        .output_rule("roi_file", from_input("roi_file"))
}

/// `bet`：腦部擷取
pub fn bet() -> CommandLineTool {
    let inputs = command_line_inputs()
        .field(
            "in_file",
            TraitSpec::file().argstr("%s").position(0).mandatory().desc("input file to skull strip"),
        )
        .field(
            "out_file",
            TraitSpec::file()
                .argstr("%s")
                .position(1)
                .genfile()
                .hash_files(false)
                .name_source(&["in_file"])
                .name_template("%s_brain.nii.gz")
                .desc("name of output skull stripped image"),
        )
        .field("frac", TraitSpec::float().argstr("-f %.2f").desc("fractional intensity threshold"))
        .field("mask", TraitSpec::flag().argstr("-m").desc("create binary mask image"))
        .field("robust", TraitSpec::flag().argstr("-R").desc("robust brain centre estimation"));
    let outputs = InterfaceSpec::new()
        .field("out_file", TraitSpec::file())
        .field("mask_file", TraitSpec::file());
    CommandLineTool::new("BET", "bet", inputs, outputs)
        .output_rule("out_file", from_input("out_file"))
        .output_rule(
            "mask_file",
            when(
                "mask",
                OutputRule::Template {
                    source: "out_file".to_string(),
                    template: "%s_mask.nii.gz".to_string(),
                },
            ),
        )
}

/// 所有 `fslmaths` 包裝共用的欄位
fn maths_inputs(suffix: &str) -> InterfaceSpec {
    command_line_inputs()
        .field(
            "in_file",
            TraitSpec::file().argstr("%s").position(2).mandatory().desc("image to operate on"),
        )
        .field(
            "out_file",
            TraitSpec::file()
                .argstr("%s")
                .position(-2)
                .genfile()
                .hash_files(false)
                .name_source(&["in_file"])
                .name_template(&format!("%s_{}.nii.gz", suffix))
                .desc("image to write"),
        )
        .field(
            "internal_datatype",
            TraitSpec::string().argstr("-dt %s").position(1).desc("datatype to use for calculations"),
        )
        .field(
            "output_datatype",
            TraitSpec::string().argstr("-odt %s").position(-1).desc("datatype to use for output"),
        )
        .field("nan2zeros", TraitSpec::flag().argstr("-nan").position(3).desc("change NaNs to zeros"))
}

fn maths_tool(name: &str, inputs: InterfaceSpec) -> CommandLineTool {
    let outputs = InterfaceSpec::new().field("out_file", TraitSpec::file());
    CommandLineTool::new(name, "fslmaths", inputs, outputs).output_rule("out_file", from_input("out_file"))
}

/// 二元運算：影像與另一影像或常數
pub fn binary_maths() -> CommandLineTool {
    let inputs = maths_inputs("maths")
        .field(
            "operation",
            TraitSpec::string()
                .argstr("-%s")
                .position(4)
                .mandatory()
                .desc("operation to perform (add, sub, mul, div, rem, max, min)"),
        )
        .field(
            "operand_file",
            TraitSpec::file().argstr("%s").position(5).xor(&["operand_file", "operand_value"]),
        )
        .field(
            "operand_value",
            TraitSpec::float()
                .argstr("%.8f")
                .position(5)
                .xor(&["operand_file", "operand_value"]),
        );
    maths_tool("BinaryMaths", inputs)
}

pub fn threshold() -> CommandLineTool {
    let inputs = maths_inputs("thresh").field(
        "thresh",
        TraitSpec::float().argstr("-thr %.10f").position(4).mandatory().desc("threshold value"),
    );
    maths_tool("Threshold", inputs)
}

/// 任意 `fslmaths` 指令，運算子由 `args` 提供
pub fn maths_command() -> CommandLineTool {
    maths_tool("MathsCommand", maths_inputs("maths"))
}

/// 以 `op_string` 串接多個影像，例如 `-mas %s -add %s`
pub fn multi_image_maths() -> CommandLineTool {
    let inputs = maths_inputs("maths")
        .field(
            "op_string",
            TraitSpec::string()
                .argstr("%s")
                .position(4)
                .mandatory()
                .desc("python formatted string of operations to perform"),
        )
        .field(
            "operand_files",
            TraitSpec::list().mandatory().desc("list of file names to plug into op string"),
        );
    maths_tool("MultiImageMaths", inputs).templated_by("op_string", "operand_files")
}

pub fn apply_mask() -> CommandLineTool {
    let inputs = maths_inputs("masked").field(
        "mask_file",
        TraitSpec::file().argstr("-mas %s").position(4).mandatory().desc("binary image defining mask space"),
    );
    maths_tool("ApplyMask", inputs)
}

/// `prelude`：相位展開
pub fn prelude() -> CommandLineTool {
    let inputs = command_line_inputs()
        .field(
            "complex_phase_file",
            TraitSpec::file()
                .argstr("--complex=%s")
                .xor(&["complex_phase_file", "magnitude_file", "phase_file"]),
        )
        .field(
            "magnitude_file",
            TraitSpec::file().argstr("--abs=%s").xor(&["complex_phase_file", "magnitude_file"]),
        )
        .field(
            "phase_file",
            TraitSpec::file().argstr("--phase=%s").xor(&["complex_phase_file", "phase_file"]),
        )
        .field(
            "unwrapped_phase_file",
            TraitSpec::file()
                .argstr("--unwrap=%s")
                .genfile()
                .hash_files(false)
                .name_source(&["phase_file", "complex_phase_file"])
                .name_template("%s_unwrapped.nii.gz")
                .desc("file containing unwrapepd phase"),
        )
        .field("mask_file", TraitSpec::file().argstr("--mask=%s"))
        .field("process3d", TraitSpec::flag().argstr("--force3D").xor(&["process2d", "process3d"]))
        .field("process2d", TraitSpec::flag().argstr("--slices").xor(&["process2d", "process3d"]))
        .field("num_partitions", TraitSpec::int().argstr("--numphasesplit=%d"));
    let outputs = InterfaceSpec::new().field("unwrapped_phase_file", TraitSpec::file());
    CommandLineTool::new("PRELUDE", "prelude", inputs, outputs)
        .output_rule("unwrapped_phase_file", from_input("unwrapped_phase_file"))
}

/// `fugue`：場圖處理與 EPI 扭曲校正
pub fn fugue() -> CommandLineTool {
    let inputs = command_line_inputs()
        .field("in_file", TraitSpec::file().argstr("--in=%s").desc("filename of input volume"))
        .field(
            "unwarped_file",
            TraitSpec::file()
                .argstr("--unwarp=%s")
                .genfile()
                .hash_files(false)
                .name_source(&["in_file"])
                .name_template("%s_unwarped.nii.gz"),
        )
        .field("fmap_in_file", TraitSpec::file().argstr("--loadfmap=%s"))
        .field(
            "fmap_out_file",
            TraitSpec::file()
                .argstr("--savefmap=%s")
                .genfile()
                .hash_files(false)
                .name_source(&["fmap_in_file", "in_file"])
                .name_template("%s_fieldmap.nii.gz"),
        )
        .field(
            "shift_out_file",
            TraitSpec::file()
                .argstr("--saveshift=%s")
                .genfile()
                .hash_files(false)
                .name_source(&["in_file", "fmap_in_file"])
                .name_template("%s_vsm.nii.gz"),
        )
        .field("mask_file", TraitSpec::file().argstr("--mask=%s"))
        .field("dwell_time", TraitSpec::float().argstr("--dwell=%.10f"))
        .field("unwarp_direction", TraitSpec::string().argstr("--unwarpdir=%s"))
        .field("smooth3d", TraitSpec::float().argstr("--smooth3=%.2f"))
        .field("despike_2dfilter", TraitSpec::flag().argstr("--despike"))
        .field("despike_threshold", TraitSpec::float().argstr("--despikethreshold=%s"))
        .field("save_unmasked_fmap", TraitSpec::flag().argstr("--unmaskfmap"))
        .field("save_fmap", TraitSpec::flag().desc("write field map volume"))
        .field("save_shift", TraitSpec::flag().desc("write pixel shift volume"));
    let outputs = InterfaceSpec::new()
        .field("unwarped_file", TraitSpec::file())
        .field("fmap_out_file", TraitSpec::file())
        .field("shift_out_file", TraitSpec::file());
    CommandLineTool::new("FUGUE", "fugue", inputs, outputs)
        .generate_when("unwarped_file", "in_file")
        .generate_when("fmap_out_file", "save_fmap")
        .generate_when("shift_out_file", "save_shift")
        .output_rule("unwarped_file", from_input("unwarped_file"))
        .output_rule("fmap_out_file", from_input("fmap_out_file"))
        .output_rule("shift_out_file", from_input("shift_out_file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FieldValue;
    use std::path::PathBuf;

    #[test]
    fn test_flirt_motion_correction_cmdline() {
        let tool = flirt()
            .with("in_file", "vol0001.nii.gz")
            .with("reference", "vol0000.nii.gz")
            .with("dof", 6)
            .with("bins", 64)
            .with("searchr_x", vec![-4, 4])
            .with("save_log", true);

        assert_eq!(
            tool.cmdline().unwrap(),
            "flirt -in vol0001.nii.gz -ref vol0000.nii.gz -out vol0001_flirt.nii.gz \
             -omat vol0001_flirt.mat -bins 64 -dof 6 -searchrx -4 4"
        );

        let outputs = tool.list_outputs().unwrap();
        assert_eq!(outputs["out_log"], FieldValue::File(PathBuf::from("vol0001_flirt.log")));
    }

    #[test]
    fn test_flirt_log_only_when_requested() {
        let tool = flirt().with("in_file", "a.nii").with("reference", "b.nii");
        let outputs = tool.list_outputs().unwrap();
        assert!(outputs.contains_key("out_matrix_file"));
        assert!(!outputs.contains_key("out_log"));
    }

    #[test]
    fn test_apply_xfm_requires_matrix() {
        let tool = apply_xfm().with("in_file", "a.nii").with("reference", "b.nii");
        assert!(tool.cmdline().is_err());

        let tool = tool.with("in_matrix_file", "a.mat");
        assert!(tool.cmdline().unwrap().contains("-applyxfm -init a.mat"));
    }

    #[test]
    fn test_binary_maths_operand_value() {
        let tool = binary_maths()
            .with("in_file", "dwi.nii.gz")
            .with("operation", "mul")
            .with("operand_value", 1.5);
        assert_eq!(
            tool.cmdline().unwrap(),
            "fslmaths dwi.nii.gz -mul 1.50000000 dwi_maths.nii.gz"
        );

        let tool = tool.with("operand_file", "other.nii.gz");
        assert!(tool.cmdline().is_err());
    }

    #[test]
    fn test_threshold_renders_ten_decimals() {
        let tool = threshold().with("in_file", "vol0001_flirt_maths.nii.gz").with("thresh", 0.0);
        assert_eq!(
            tool.cmdline().unwrap(),
            "fslmaths vol0001_flirt_maths.nii.gz -thr 0.0000000000 vol0001_flirt_maths_thresh.nii.gz"
        );
    }

    #[test]
    fn test_multi_image_maths_fills_op_string() {
        let tool = multi_image_maths()
            .with("in_file", "fmap.nii.gz")
            .with("op_string", "-mas %s -add %s")
            .with("operand_files", vec!["core.nii.gz", "edge.nii.gz"]);
        assert_eq!(
            tool.cmdline().unwrap(),
            "fslmaths fmap.nii.gz -mas core.nii.gz -add edge.nii.gz fmap_maths.nii.gz"
        );
    }

    #[test]
    fn test_bet_mask_output() {
        let tool = bet().with("in_file", "/data/mag.nii.gz").with("frac", 0.4).with("mask", true);
        assert_eq!(tool.cmdline().unwrap(), "bet /data/mag.nii.gz mag_brain.nii.gz -f 0.40 -m");
        let outputs = tool.list_outputs().unwrap();
        assert_eq!(outputs["mask_file"], FieldValue::File(PathBuf::from("mag_brain_mask.nii.gz")));
    }

    #[test]
    fn test_extract_roi_positions() {
        let tool = extract_roi().with("in_file", "mag.nii").with("t_min", 0).with("t_size", 1);
        assert_eq!(tool.cmdline().unwrap(), "fslroi mag.nii mag_roi.nii.gz 0 1");
    }

    #[test]
    fn test_fugue_only_saves_fmap_when_asked() {
        let tool = fugue().with("fmap_in_file", "fmap.nii.gz").with("mask_file", "mask.nii.gz");
        assert_eq!(tool.cmdline().unwrap(), "fugue --loadfmap=fmap.nii.gz --mask=mask.nii.gz");

        let tool = tool.with("save_fmap", true);
        assert!(tool.cmdline().unwrap().contains("--savefmap=fmap_fieldmap.nii.gz"));
        assert!(tool.list_outputs().unwrap().contains_key("fmap_out_file"));
    }

    #[test]
    fn test_prelude_cmdline() {
        let tool = prelude()
            .with("phase_file", "pha_rads.nii.gz")
            .with("magnitude_file", "mag.nii.gz")
            .with("process3d", true);
        assert_eq!(
            tool.cmdline().unwrap(),
            "prelude --abs=mag.nii.gz --phase=pha_rads.nii.gz --force3D --unwrap=pha_rads_unwrapped.nii.gz"
        );
    }

    #[test]
    fn test_split_requires_dimension() {
        assert!(split().with("in_file", "dwi.nii.gz").cmdline().is_err());
        assert_eq!(
            split().with("in_file", "dwi.nii.gz").with("dimension", "t").cmdline().unwrap(),
            "fslsplit dwi.nii.gz -t"
        );
    }
}
