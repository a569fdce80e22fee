//! 外部命令列工具的通用包裝
//!
//! A [`CommandLineTool`] pairs an executable name with the input/output specs
//! of [`crate::interfaces::spec`] and renders the argument list from the
//! inputs that are set. Running the executable is left to whatever engine
//! consumes the rendered command line.

use crate::domain::model::FieldValue;
use crate::domain::ports::Interface;
use crate::interfaces::spec::{InterfaceSpec, TraitSpec};
use crate::utils::error::{PrepError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PLACEHOLDER_PATTERN: &str = r"%(?:\.(\d+))?([sdfg])";

/// 需要保留的雙副檔名
const DOUBLE_EXTENSIONS: &[&str] = &[".nii.gz", ".mnc.gz", ".tar.gz", ".BRIK.gz", ".HEAD.gz"];

/// 輸出欄位的推導規則
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRule {
    /// 與某個輸入（含自動產生的檔名）相同
    FromInput(String),
    /// 以 `source` 輸入的檔名套入樣板
    Template { source: String, template: String },
    /// 對另一個輸出做正規表示式替換
    Rewrite {
        output: String,
        pattern: String,
        replacement: String,
    },
    /// 只有在布林輸入為 true 時才存在
    When { flag: String, rule: Box<OutputRule> },
}

#[derive(Debug, Clone)]
pub struct CommandLineTool {
    name: String,
    cmd: String,
    input_spec: InterfaceSpec,
    output_spec: InterfaceSpec,
    inputs: BTreeMap<String, FieldValue>,
    output_rules: Vec<(String, OutputRule)>,
    output_dir: Option<PathBuf>,
    /// 只有在另一個輸入成立時才自動產生檔名
    gates: Vec<(String, String)>,
    /// 欄位的值本身就是 argstr，由另一個串列欄位填入
    templated: Vec<(String, String)>,
}

impl CommandLineTool {
    pub fn new(name: &str, cmd: &str, input_spec: InterfaceSpec, output_spec: InterfaceSpec) -> Self {
        Self {
            name: name.to_string(),
            cmd: cmd.to_string(),
            input_spec,
            output_spec,
            inputs: BTreeMap::new(),
            output_rules: Vec::new(),
            output_dir: None,
            gates: Vec::new(),
            templated: Vec::new(),
        }
    }

    pub fn output_rule(mut self, output: &str, rule: OutputRule) -> Self {
        self.output_rules.push((output.to_string(), rule));
        self
    }

    /// `field` 的檔名只在 `gate` 為 true（或已設定非布林值）時產生
    pub fn generate_when(mut self, field: &str, gate: &str) -> Self {
        self.gates.push((field.to_string(), gate.to_string()));
        self
    }

    /// `field` 的值作為 argstr，由 `operands` 的值填入 placeholder
    pub fn templated_by(mut self, field: &str, operands: &str) -> Self {
        self.templated.push((field.to_string(), operands.to_string()));
        self
    }

    /// 設定輸入；欄位名稱在 `check_inputs` 或 `Workflow::validate` 時檢查
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.inputs.insert(field.to_string(), value.into());
        self
    }

    /// 產生的檔名放在此目錄，未設定時使用相對檔名
    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// 所有已設定的輸入都必須存在於 input spec
    pub fn check_inputs(&self) -> Result<()> {
        for field in self.inputs.keys() {
            if !self.input_spec.contains(field) {
                return Err(PrepError::interface(
                    &self.name,
                    format!("unknown input '{}'", field),
                ));
            }
        }
        Ok(())
    }

    fn is_set(&self, field: &str) -> bool {
        self.inputs.get(field).map(FieldValue::is_defined).unwrap_or(false)
    }

    fn gate_open(&self, field: &str) -> Result<bool> {
        match self.gates.iter().find(|(f, _)| f == field) {
            None => Ok(true),
            Some((_, gate)) => Ok(match self.resolved_input(gate)? {
                FieldValue::Bool(b) => b,
                other => other.is_defined(),
            }),
        }
    }

    /// 欄位的實際值：已設定 > 預設值 > 自動產生的檔名
    pub fn resolved_input(&self, field: &str) -> Result<FieldValue> {
        if let Some(value) = self.inputs.get(field).filter(|v| v.is_defined()) {
            return Ok(value.clone());
        }

        let spec = match self.input_spec.get(field) {
            Some(spec) => spec,
            None => {
                return Err(PrepError::interface(
                    &self.name,
                    format!("unknown input '{}'", field),
                ))
            }
        };

        if spec.usedefault.unwrap_or(false) {
            if let Some(default) = &spec.default {
                return Ok(default.clone());
            }
        }

        if spec.is_genfile() && self.gate_open(field)? {
            if let Some(path) = self.generate_filename(field, spec)? {
                return Ok(FieldValue::File(path));
            }
        }

        Ok(FieldValue::Undefined)
    }

    /// 依 `name_source` 與 `name_template` 產生檔名
    fn generate_filename(&self, field: &str, spec: &TraitSpec) -> Result<Option<PathBuf>> {
        let (sources, template) = match (&spec.name_source, &spec.name_template) {
            (Some(sources), Some(template)) => (sources, template),
            _ => return Ok(None),
        };

        let source_value = sources
            .iter()
            .find_map(|s| self.inputs.get(s).filter(|v| v.is_defined()));

        let source_path = match source_value {
            Some(FieldValue::List(items)) => items.first().and_then(FieldValue::as_path),
            Some(value) => value.as_path(),
            None => None,
        };

        let source_path = match source_path {
            Some(path) => path,
            None => {
                return Err(PrepError::MissingInput {
                    interface: self.name.clone(),
                    field: format!("{} (needed to name '{}')", sources.join("|"), field),
                })
            }
        };

        let (_, base, ext) = split_filename(&source_path);
        let mut name = if template.contains("%s") {
            template.replacen("%s", &base, 1)
        } else {
            template.clone()
        };
        if spec.keep_extension.unwrap_or(false) {
            name.push_str(&ext);
        }

        Ok(Some(match &self.output_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }))
    }

    fn check_constraints(&self) -> Result<()> {
        self.check_inputs()?;

        for (field, spec) in self.input_spec.traits() {
            if spec.is_mandatory() && !self.is_set(field) && !spec.is_genfile() {
                return Err(PrepError::MissingInput {
                    interface: self.name.clone(),
                    field: field.to_string(),
                });
            }

            if !self.is_set(field) {
                continue;
            }

            if let Some(xor) = &spec.xor {
                if let Some(other) = xor.iter().find(|o| o.as_str() != field && self.is_set(o)) {
                    return Err(PrepError::interface(
                        &self.name,
                        format!("'{}' and '{}' are mutually exclusive", field, other),
                    ));
                }
            }

            if let Some(requires) = &spec.requires {
                if let Some(missing) = requires.iter().find(|r| !self.is_set(r)) {
                    return Err(PrepError::interface(
                        &self.name,
                        format!("'{}' requires '{}' to be set", field, missing),
                    ));
                }
            }
        }

        Ok(())
    }

    /// 依 position 排序後的參數群組
    pub fn arguments(&self) -> Result<Vec<String>> {
        self.check_constraints()?;

        let mut positioned: Vec<(i32, String)> = Vec::new();
        let mut unpositioned: Vec<(String, String)> = Vec::new();
        let mut trailing: Vec<(i32, String)> = Vec::new();

        for (field, spec) in self.input_spec.traits() {
            let argstr = match &spec.argstr {
                Some(argstr) => argstr,
                None => continue,
            };

            let (argstr, value) = match self.templated.iter().find(|(f, _)| f == field) {
                Some((_, operands)) => match self.resolved_input(field)? {
                    FieldValue::Undefined => continue,
                    template => (template.to_string(), self.resolved_input(operands)?),
                },
                None => (argstr.clone(), self.resolved_input(field)?),
            };
            let rendered = match format_argstr(&self.name, field, &argstr, &value, spec.sep.as_deref())? {
                Some(rendered) => rendered,
                None => continue,
            };

            match spec.position {
                Some(p) if p >= 0 => positioned.push((p, rendered)),
                Some(p) => trailing.push((p, rendered)),
                None => unpositioned.push((field.to_string(), rendered)),
            }
        }

        positioned.sort_by_key(|(p, _)| *p);
        unpositioned.sort_by(|a, b| a.0.cmp(&b.0));
        trailing.sort_by_key(|(p, _)| *p);

        Ok(positioned
            .into_iter()
            .map(|(_, a)| a)
            .chain(unpositioned.into_iter().map(|(_, a)| a))
            .chain(trailing.into_iter().map(|(_, a)| a))
            .collect())
    }

    /// 完整命令列字串
    pub fn cmdline(&self) -> Result<String> {
        let mut parts = vec![self.cmd.clone()];
        parts.extend(self.arguments()?);
        let cmdline = parts.join(" ");
        tracing::debug!("{} command line: {}", self.name, cmdline);
        Ok(cmdline)
    }


    fn resolve_rule(&self, rule: &OutputRule, resolved: &BTreeMap<String, FieldValue>) -> Result<FieldValue> {
        match rule {
            OutputRule::FromInput(field) => self.resolved_input(field),
            OutputRule::Template { source, template } => {
                let value = self.resolved_input(source)?;
                match value.as_path() {
                    Some(path) => {
                        let (_, base, _) = split_filename(&path);
                        let name = template.replacen("%s", &base, 1);
                        Ok(FieldValue::File(match &self.output_dir {
                            Some(dir) => dir.join(name),
                            None => PathBuf::from(name),
                        }))
                    }
                    None => Ok(FieldValue::Undefined),
                }
            }
            OutputRule::Rewrite {
                output,
                pattern,
                replacement,
            } => {
                let base = resolved.get(output).and_then(FieldValue::as_path);
                match base {
                    Some(path) => {
                        let re = Regex::new(pattern).map_err(|e| {
                            PrepError::interface(&self.name, format!("invalid output pattern: {}", e))
                        })?;
                        let text = path.to_string_lossy();
                        Ok(FieldValue::File(PathBuf::from(
                            re.replace(&text, replacement.as_str()).into_owned(),
                        )))
                    }
                    None => Ok(FieldValue::Undefined),
                }
            }
            OutputRule::When { flag, rule } => {
                if self.resolved_input(flag)?.as_bool().unwrap_or(false) {
                    self.resolve_rule(rule, resolved)
                } else {
                    Ok(FieldValue::Undefined)
                }
            }
        }
    }

    /// 推導輸出檔案路徑
    pub fn list_outputs(&self) -> Result<BTreeMap<String, FieldValue>> {
        let mut outputs = BTreeMap::new();
        for (name, rule) in &self.output_rules {
            let value = self.resolve_rule(rule, &outputs)?;
            if value.is_defined() {
                outputs.insert(name.clone(), value);
            }
        }
        Ok(outputs)
    }
}

impl Interface for CommandLineTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_spec(&self) -> &InterfaceSpec {
        &self.input_spec
    }

    fn output_spec(&self) -> &InterfaceSpec {
        &self.output_spec
    }

    fn inputs(&self) -> &BTreeMap<String, FieldValue> {
        &self.inputs
    }

    fn inputs_mut(&mut self) -> &mut BTreeMap<String, FieldValue> {
        &mut self.inputs
    }

    fn as_command(&self) -> Option<&CommandLineTool> {
        Some(self)
    }
}

/// 將檔名拆成 (目錄, 主檔名, 副檔名)，認得 `.nii.gz` 等雙副檔名
pub fn split_filename(path: &Path) -> (PathBuf, String, String) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    for ext in DOUBLE_EXTENSIONS {
        if file_name.len() > ext.len() && file_name.ends_with(ext) {
            let base = file_name[..file_name.len() - ext.len()].to_string();
            return (dir, base, ext.to_string());
        }
    }

    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (
            dir,
            file_name[..idx].to_string(),
            file_name[idx..].to_string(),
        ),
        _ => (dir, file_name, String::new()),
    }
}

/// 以 printf 風格的 argstr 呈現一個值；`None` 代表不輸出
pub fn format_argstr(
    interface: &str,
    field: &str,
    argstr: &str,
    value: &FieldValue,
    sep: Option<&str>,
) -> Result<Option<String>> {
    let re = Regex::new(PLACEHOLDER_PATTERN)
        .map_err(|e| PrepError::interface(interface, format!("invalid placeholder pattern: {}", e)))?;
    let placeholders = re.find_iter(argstr).count();

    match value {
        FieldValue::Undefined => return Ok(None),
        FieldValue::Bool(false) => return Ok(None),
        FieldValue::Bool(true) if placeholders == 0 => return Ok(Some(argstr.to_string())),
        _ => {}
    }

    if placeholders == 0 {
        return Ok(Some(argstr.to_string()));
    }

    let values: Vec<&FieldValue> = match value {
        FieldValue::List(items) if placeholders > 1 => {
            if items.len() != placeholders {
                return Err(PrepError::interface(
                    interface,
                    format!(
                        "'{}' expects {} values for '{}', got {}",
                        field,
                        placeholders,
                        argstr,
                        items.len()
                    ),
                ));
            }
            items.iter().collect()
        }
        other => vec![other],
    };

    let mut index = 0;
    let mut failure = None;
    let rendered = re.replace_all(argstr, |caps: &regex::Captures| {
        let current = values[index.min(values.len() - 1)];
        index += 1;
        let precision = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok());
        match render_placeholder(current, &caps[2], precision, sep.unwrap_or(" ")) {
            Some(text) => text,
            None => {
                failure = Some(format!("'{}' cannot render {} with '{}'", field, current, &caps[0]));
                String::new()
            }
        }
    });

    if let Some(message) = failure {
        return Err(PrepError::interface(interface, message));
    }

    Ok(Some(rendered.into_owned()))
}

fn render_placeholder(value: &FieldValue, conversion: &str, precision: Option<usize>, sep: &str) -> Option<String> {
    if let FieldValue::List(items) = value {
        let parts = items
            .iter()
            .map(|item| render_placeholder(item, conversion, precision, sep))
            .collect::<Option<Vec<String>>>()?;
        return Some(parts.join(sep));
    }

    match conversion {
        "s" => Some(value.to_string()),
        "d" => value.as_int().map(|i| i.to_string()),
        "f" => value
            .as_float()
            .map(|f| format!("{:.*}", precision.unwrap_or(6), f)),
        "g" => value.as_float().map(|f| match precision {
            Some(p) => format!("{:.*}", p, f),
            None => format!("{}", f),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::spec::command_line_inputs;

    fn toy_tool() -> CommandLineTool {
        let inputs = command_line_inputs()
            .field("in_file", TraitSpec::file().argstr("-in %s").position(0).mandatory())
            .field(
                "out_file",
                TraitSpec::file()
                    .argstr("-out %s")
                    .position(1)
                    .genfile()
                    .name_source(&["in_file"])
                    .name_template("%s_toy")
                    .keep_extension(),
            )
            .field("bins", TraitSpec::int().argstr("-bins %d"))
            .field("frac", TraitSpec::float().argstr("-f %.2f"))
            .field("search", TraitSpec::list().argstr("-searchrx %d %d"))
            .field("dims", TraitSpec::list().argstr("-dims %s").sep(","))
            .field("verbose", TraitSpec::flag().argstr("-v").xor(&["quiet"]))
            .field("quiet", TraitSpec::flag().argstr("-q").xor(&["verbose"]))
            .field("last", TraitSpec::string().argstr("%s").position(-1))
            .field("second_last", TraitSpec::string().argstr("%s").position(-2));
        let outputs = InterfaceSpec::new().field("out_file", TraitSpec::file());
        CommandLineTool::new("Toy", "toy", inputs, outputs)
            .output_rule("out_file", OutputRule::FromInput("out_file".to_string()))
    }

    #[test]
    fn test_split_filename_knows_double_extensions() {
        let (dir, base, ext) = split_filename(Path::new("/data/sub-01_dwi.nii.gz"));
        assert_eq!(dir, PathBuf::from("/data"));
        assert_eq!(base, "sub-01_dwi");
        assert_eq!(ext, ".nii.gz");

        let (_, base, ext) = split_filename(Path::new("brain.mnc"));
        assert_eq!((base.as_str(), ext.as_str()), ("brain", ".mnc"));

        let (_, base, ext) = split_filename(Path::new(".hidden"));
        assert_eq!((base.as_str(), ext.as_str()), (".hidden", ""));
    }

    #[test]
    fn test_cmdline_orders_positions_then_names_then_trailing() {
        let tool = toy_tool()
            .with("in_file", "/data/dwi.nii.gz")
            .with("bins", 64)
            .with("verbose", true)
            .with("last", "Z")
            .with("second_last", "Y");

        assert_eq!(
            tool.cmdline().unwrap(),
            "toy -in /data/dwi.nii.gz -out dwi_toy.nii.gz -bins 64 -v Y Z"
        );
    }

    #[test]
    fn test_list_and_precision_formatting() {
        let tool = toy_tool()
            .with("in_file", "a.nii")
            .with("frac", 0.4)
            .with("search", vec![-4, 4])
            .with("dims", vec![1, 2, 3]);

        let args = tool.arguments().unwrap();
        assert!(args.contains(&"-f 0.40".to_string()));
        assert!(args.contains(&"-searchrx -4 4".to_string()));
        assert!(args.contains(&"-dims 1,2,3".to_string()));
    }

    #[test]
    fn test_wrong_list_length_is_rejected() {
        let tool = toy_tool().with("in_file", "a.nii").with("search", vec![-4, 0, 4]);
        assert!(tool.cmdline().is_err());
    }

    #[test]
    fn test_missing_mandatory_input() {
        let err = toy_tool().cmdline().unwrap_err();
        assert!(matches!(err, PrepError::MissingInput { ref field, .. } if field == "in_file"));
    }

    #[test]
    fn test_xor_conflict_is_rejected() {
        let tool = toy_tool()
            .with("in_file", "a.nii")
            .with("verbose", true)
            .with("quiet", true);
        assert!(matches!(tool.cmdline(), Err(PrepError::InterfaceError { .. })));
    }

    #[test]
    fn test_unknown_input_is_rejected() {
        let tool = toy_tool().with("in_file", "a.nii").with("nonsense", 1);
        assert!(tool.check_inputs().is_err());
        assert!(tool.cmdline().is_err());
    }

    #[test]
    fn test_generated_names_use_output_dir() {
        let tool = toy_tool().with("in_file", "/data/dwi.nii").with_output_dir("/work");
        let outputs = tool.list_outputs().unwrap();
        assert_eq!(
            outputs.get("out_file"),
            Some(&FieldValue::File(PathBuf::from("/work/dwi_toy.nii")))
        );
    }

    #[test]
    fn test_explicit_value_overrides_generated_name() {
        let tool = toy_tool().with("in_file", "dwi.nii").with("out_file", "custom.nii");
        assert!(tool.cmdline().unwrap().contains("-out custom.nii"));
    }

    #[test]
    fn test_set_input_goes_through_spec() {
        let mut tool = toy_tool();
        assert!(tool.set_input("bins", FieldValue::Int(32)).is_ok());
        assert!(tool.set_input("nonsense", FieldValue::Int(1)).is_err());
        assert_eq!(tool.input("bins"), Some(&FieldValue::Int(32)));
    }
}
