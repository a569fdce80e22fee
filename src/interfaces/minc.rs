//! MINC 工具包裝

use crate::domain::model::FieldValue;
use crate::domain::ports::Interface;
use crate::interfaces::command::{CommandLineTool, OutputRule};
use crate::interfaces::spec::{command_line_inputs, InterfaceSpec, TraitSpec};
use crate::utils::error::Result;
use std::collections::BTreeMap;
use std::path::Path;

/// `gennlxfm`：產生一個與參考 grid 相同幾何的非線性轉換 (.xfm)
///
/// ```
/// use dmri_prep::interfaces::minc::Gennlxfm;
///
/// let gen = Gennlxfm::new().like("/data/t1.mnc").step(4);
/// assert_eq!(
///     gen.cmdline().unwrap(),
///     "gennlxfm -clobber -like /data/t1.mnc -step 4 t1_gennlxfm.xfm"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Gennlxfm {
    tool: CommandLineTool,
}

impl Gennlxfm {
    pub fn input_spec() -> InterfaceSpec {
        command_line_inputs()
            .field(
                "clobber",
                TraitSpec::flag()
                    .argstr("-clobber")
                    .usedefault(true)
                    .desc("Overwrite existing file."),
            )
            .field(
                "ident",
                TraitSpec::flag()
                    .argstr("-ident")
                    .desc("Generate an identity xfm. Default: False."),
            )
            .field(
                "like",
                TraitSpec::file()
                    .argstr("-like %s")
                    .desc("Generate a nlxfm like this file."),
            )
            .field(
                "output_file",
                TraitSpec::file()
                    .argstr("%s")
                    .genfile()
                    .hash_files(false)
                    .name_source(&["like"])
                    .name_template("%s_gennlxfm.xfm")
                    .position(-1)
                    .desc("output file"),
            )
            .field(
                "step",
                TraitSpec::int()
                    .argstr("-step %s")
                    .desc("Output ticks every N voxels."),
            )
            .field(
                "verbose",
                TraitSpec::flag()
                    .argstr("-verbose")
                    .desc("Print out log messages. Default: False."),
            )
    }

    pub fn output_spec() -> InterfaceSpec {
        InterfaceSpec::new()
            .field("output_file", TraitSpec::file().desc("output file"))
            .field("output_grid", TraitSpec::file().desc("output grid"))
    }

    pub fn new() -> Self {
        let tool = CommandLineTool::new("Gennlxfm", "gennlxfm", Self::input_spec(), Self::output_spec())
            .output_rule("output_file", OutputRule::FromInput("output_file".to_string()))
            .output_rule(
                "output_grid",
                OutputRule::Rewrite {
                    output: "output_file".to_string(),
                    pattern: r"\.(nlxfm|xfm)$".to_string(),
                    replacement: "_grid_0.mnc".to_string(),
                },
            );
        Self { tool }
    }

    pub fn like<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tool = self.tool.with("like", path.as_ref());
        self
    }

    pub fn step(mut self, step: i64) -> Self {
        self.tool = self.tool.with("step", step);
        self
    }

    pub fn ident(mut self, ident: bool) -> Self {
        self.tool = self.tool.with("ident", ident);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.tool = self.tool.with("verbose", verbose);
        self
    }

    pub fn clobber(mut self, clobber: bool) -> Self {
        self.tool = self.tool.with("clobber", clobber);
        self
    }

    pub fn output_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tool = self.tool.with("output_file", path.as_ref());
        self
    }

    pub fn output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.tool = self.tool.with_output_dir(dir);
        self
    }

    pub fn cmdline(&self) -> Result<String> {
        self.tool.cmdline()
    }

    pub fn list_outputs(&self) -> Result<BTreeMap<String, FieldValue>> {
        self.tool.list_outputs()
    }
}

impl Default for Gennlxfm {
    fn default() -> Self {
        Self::new()
    }
}

impl Interface for Gennlxfm {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn input_spec(&self) -> &InterfaceSpec {
        self.tool.input_spec()
    }

    fn output_spec(&self) -> &InterfaceSpec {
        self.tool.output_spec()
    }

    fn inputs(&self) -> &BTreeMap<String, FieldValue> {
        self.tool.inputs()
    }

    fn inputs_mut(&mut self) -> &mut BTreeMap<String, FieldValue> {
        self.tool.inputs_mut()
    }

    fn as_command(&self) -> Option<&CommandLineTool> {
        Some(&self.tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_clobber_is_on_unless_disabled() {
        let gen = Gennlxfm::new().like("t1.mnc");
        assert!(gen.cmdline().unwrap().contains("-clobber"));

        let gen = Gennlxfm::new().like("t1.mnc").clobber(false);
        assert!(!gen.cmdline().unwrap().contains("-clobber"));
    }

    #[test]
    fn test_output_file_is_always_last() {
        let gen = Gennlxfm::new()
            .like("/data/t1.mnc")
            .ident(true)
            .verbose(true)
            .output_file("nl.xfm");
        let cmdline = gen.cmdline().unwrap();
        assert_eq!(cmdline, "gennlxfm -clobber -ident -like /data/t1.mnc -verbose nl.xfm");
    }

    #[test]
    fn test_output_grid_follows_output_file() {
        let outputs = Gennlxfm::new().like("/data/t1.mnc").output_dir("/work").list_outputs().unwrap();
        assert_eq!(
            outputs["output_file"],
            FieldValue::File(PathBuf::from("/work/t1_gennlxfm.xfm"))
        );
        assert_eq!(
            outputs["output_grid"],
            FieldValue::File(PathBuf::from("/work/t1_gennlxfm_grid_0.mnc"))
        );

        let outputs = Gennlxfm::new().output_file("warp.nlxfm").list_outputs().unwrap();
        assert_eq!(outputs["output_grid"], FieldValue::File(PathBuf::from("warp_grid_0.mnc")));
    }

    #[test]
    fn test_output_name_needs_like() {
        assert!(Gennlxfm::new().cmdline().is_err());
        assert!(Gennlxfm::new().output_file("nl.xfm").cmdline().is_ok());
    }
}
