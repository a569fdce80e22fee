//! ANTs 工具包裝

use crate::interfaces::command::{CommandLineTool, OutputRule};
use crate::interfaces::spec::{command_line_inputs, InterfaceSpec, TraitSpec};

/// `N4BiasFieldCorrection`：N4 偏場校正
pub fn n4_bias_field_correction() -> CommandLineTool {
    let inputs = command_line_inputs()
        .field(
            "dimension",
            TraitSpec::int()
                .argstr("-d %d")
                .usedefault(3)
                .desc("image dimension (2 or 3)"),
        )
        .field(
            "input_image",
            TraitSpec::file()
                .argstr("--input-image %s")
                .mandatory()
                .desc("image to apply transformation to"),
        )
        .field("mask_image", TraitSpec::file().argstr("--mask-image %s"))
        .field("shrink_factor", TraitSpec::int().argstr("--shrink-factor %d"))
        .field(
            "bspline_fitting_distance",
            TraitSpec::float().argstr("--bspline-fitting [ %g ]"),
        )
        .field(
            "output_image",
            TraitSpec::file()
                .argstr("--output %s")
                .genfile()
                .hash_files(false)
                .name_source(&["input_image"])
                .name_template("%s_corrected.nii.gz")
                .desc("output file name"),
        )
        .field("save_bias", TraitSpec::flag().usedefault(false).desc("save the estimated bias field"));
    let outputs = InterfaceSpec::new()
        .field("output_image", TraitSpec::file())
        .field("bias_image", TraitSpec::file());

    CommandLineTool::new("N4BiasFieldCorrection", "N4BiasFieldCorrection", inputs, outputs)
        .output_rule("output_image", OutputRule::FromInput("output_image".to_string()))
        .output_rule(
            "bias_image",
            OutputRule::When {
                flag: "save_bias".to_string(),
                rule: Box::new(OutputRule::Template {
                    source: "input_image".to_string(),
                    template: "%s_bias.nii.gz".to_string(),
                }),
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FieldValue;
    use std::path::PathBuf;

    #[test]
    fn test_n4_defaults_to_three_dimensions() {
        let tool = n4_bias_field_correction().with("input_image", "/data/mag_roi.nii.gz");
        assert_eq!(
            tool.cmdline().unwrap(),
            "N4BiasFieldCorrection -d 3 --input-image /data/mag_roi.nii.gz --output mag_roi_corrected.nii.gz"
        );
    }

    #[test]
    fn test_n4_bias_image_only_when_saved() {
        let tool = n4_bias_field_correction().with("input_image", "mag.nii.gz");
        assert!(!tool.list_outputs().unwrap().contains_key("bias_image"));

        let outputs = tool.with("save_bias", true).list_outputs().unwrap();
        assert_eq!(outputs["bias_image"], FieldValue::File(PathBuf::from("mag_bias.nii.gz")));
    }
}
