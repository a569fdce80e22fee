pub mod ants;
pub mod command;
pub mod fsl;
pub mod minc;
pub mod spec;
pub mod utility;

use crate::domain::ports::Interface;

/// 可依名稱查詢的命令列工具
pub const REGISTERED_TOOLS: &[&str] = &[
    "Gennlxfm",
    "Split",
    "Merge",
    "FLIRT",
    "ApplyXfm",
    "ExtractROI",
    "BET",
    "BinaryMaths",
    "Threshold",
    "MathsCommand",
    "MultiImageMaths",
    "ApplyMask",
    "PRELUDE",
    "FUGUE",
    "N4BiasFieldCorrection",
];

/// 依名稱（不分大小寫）建立一個工具包裝
pub fn lookup(name: &str) -> Option<Box<dyn Interface>> {
    let tool: Box<dyn Interface> = match name.to_ascii_lowercase().as_str() {
        "gennlxfm" => Box::new(minc::Gennlxfm::new()),
        "split" => Box::new(fsl::split()),
        "merge" => Box::new(fsl::merge()),
        "flirt" => Box::new(fsl::flirt()),
        "applyxfm" => Box::new(fsl::apply_xfm()),
        "extractroi" => Box::new(fsl::extract_roi()),
        "bet" => Box::new(fsl::bet()),
        "binarymaths" => Box::new(fsl::binary_maths()),
        "threshold" => Box::new(fsl::threshold()),
        "mathscommand" => Box::new(fsl::maths_command()),
        "multiimagemaths" => Box::new(fsl::multi_image_maths()),
        "applymask" => Box::new(fsl::apply_mask()),
        "prelude" => Box::new(fsl::prelude()),
        "fugue" => Box::new(fsl::fugue()),
        "n4biasfieldcorrection" | "n4" => Box::new(ants::n4_bias_field_correction()),
        _ => return None,
    };
    Some(tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_registered_tool_resolves() {
        for name in REGISTERED_TOOLS {
            let tool = lookup(name).unwrap();
            assert_eq!(tool.name(), *name);
            assert!(tool.as_command().is_some());
        }
        assert!(lookup("bogus").is_none());
    }
}
