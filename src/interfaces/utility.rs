//! 不呼叫外部程式的工具節點

use crate::domain::model::FieldValue;
use crate::domain::ports::Interface;
use crate::interfaces::spec::{InterfaceSpec, TraitSpec};
use crate::utils::error::{PrepError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

fn any_fields(names: &[&str]) -> InterfaceSpec {
    let mut spec = InterfaceSpec::new();
    for name in names {
        spec.insert(name, TraitSpec::any());
    }
    spec
}

/// 將欄位原封不動轉出，作為 workflow 的輸入/輸出節點
#[derive(Debug, Clone)]
pub struct IdentityInterface {
    fields: InterfaceSpec,
    inputs: BTreeMap<String, FieldValue>,
}

impl IdentityInterface {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: any_fields(fields),
            inputs: BTreeMap::new(),
        }
    }
}

impl Interface for IdentityInterface {
    fn name(&self) -> &str {
        "IdentityInterface"
    }

    fn input_spec(&self) -> &InterfaceSpec {
        &self.fields
    }

    fn output_spec(&self) -> &InterfaceSpec {
        &self.fields
    }

    fn inputs(&self) -> &BTreeMap<String, FieldValue> {
        &self.inputs
    }

    fn inputs_mut(&mut self) -> &mut BTreeMap<String, FieldValue> {
        &mut self.inputs
    }
}

/// 依索引從串列中挑出元素
#[derive(Debug, Clone)]
pub struct Select {
    input_spec: InterfaceSpec,
    output_spec: InterfaceSpec,
    inputs: BTreeMap<String, FieldValue>,
}

impl Select {
    pub fn new() -> Self {
        Self {
            input_spec: InterfaceSpec::new()
                .field("inlist", TraitSpec::list().mandatory().desc("list of values to choose from"))
                .field("index", TraitSpec::any().mandatory().desc("0-based indices of values to choose")),
            output_spec: InterfaceSpec::new().field("out", TraitSpec::any().desc("list of selected values")),
            inputs: BTreeMap::new(),
        }
    }

    /// 單一索引回傳單一元素，索引串列回傳子串列
    pub fn select(inlist: &[FieldValue], index: &FieldValue) -> Result<FieldValue> {
        let pick = |i: i64| -> Result<FieldValue> {
            usize::try_from(i)
                .ok()
                .and_then(|i| inlist.get(i))
                .cloned()
                .ok_or_else(|| {
                    PrepError::interface(
                        "Select",
                        format!("index {} out of range for {} items", i, inlist.len()),
                    )
                })
        };

        match index {
            FieldValue::List(indices) => indices
                .iter()
                .map(|i| match i.as_int() {
                    Some(i) => pick(i),
                    None => Err(PrepError::interface("Select", format!("invalid index {}", i))),
                })
                .collect::<Result<Vec<_>>>()
                .map(FieldValue::List),
            other => match other.as_int() {
                Some(i) => pick(i),
                None => Err(PrepError::interface("Select", format!("invalid index {}", other))),
            },
        }
    }
}

impl Default for Select {
    fn default() -> Self {
        Self::new()
    }
}

impl Interface for Select {
    fn name(&self) -> &str {
        "Select"
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
}

/// 將 `in1..inN` 合併成一個串列
#[derive(Debug, Clone)]
pub struct Merge {
    input_spec: InterfaceSpec,
    output_spec: InterfaceSpec,
    inputs: BTreeMap<String, FieldValue>,
}

impl Merge {
    pub fn new(numinputs: usize) -> Self {
        let mut input_spec = InterfaceSpec::new();
        for i in 1..=numinputs {
            input_spec.insert(&format!("in{}", i), TraitSpec::any());
        }
        Self {
            input_spec,
            output_spec: InterfaceSpec::new().field("out", TraitSpec::list().desc("merged output")),
            inputs: BTreeMap::new(),
        }
    }

    /// 串列會被攤平，未定義的值略過
    pub fn merge(values: &[FieldValue]) -> FieldValue {
        let mut out = Vec::new();
        for value in values {
            match value {
                FieldValue::Undefined => {}
                FieldValue::List(items) => out.extend(items.iter().cloned()),
                other => out.push(other.clone()),
            }
        }
        FieldValue::List(out)
    }
}

impl Interface for Merge {
    fn name(&self) -> &str {
        "Merge"
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
}

/// `Function` 節點可以呼叫的 [`crate::app::functions`] helper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Helper {
    RotateBvecs,
    B0Average,
    CheckInitXfms,
    RecomposeXfm,
    RecomposeDwi,
    Siemens2rads,
    Rads2radsec,
    DemeanImage,
}

impl Helper {
    pub const ALL: [Helper; 8] = [
        Helper::RotateBvecs,
        Helper::B0Average,
        Helper::CheckInitXfms,
        Helper::RecomposeXfm,
        Helper::RecomposeDwi,
        Helper::Siemens2rads,
        Helper::Rads2radsec,
        Helper::DemeanImage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Helper::RotateBvecs => "rotate_bvecs",
            Helper::B0Average => "b0_average",
            Helper::CheckInitXfms => "check_init_xfms",
            Helper::RecomposeXfm => "recompose_xfm",
            Helper::RecomposeDwi => "recompose_dwi",
            Helper::Siemens2rads => "siemens2rads",
            Helper::Rads2radsec => "rads2radsec",
            Helper::DemeanImage => "demean_image",
        }
    }

    /// 依呼叫順序排列的參數名稱
    pub fn input_names(&self) -> &'static [&'static str] {
        match self {
            Helper::RotateBvecs => &["in_bvec", "in_matrix"],
            Helper::B0Average => &["in_dwi", "in_bval"],
            Helper::CheckInitXfms | Helper::RecomposeXfm => &["in_bval", "in_xfms"],
            Helper::RecomposeDwi => &["in_dwi", "in_bval", "in_corrected"],
            Helper::Siemens2rads => &["in_file"],
            Helper::Rads2radsec => &["in_file", "delta_te"],
            Helper::DemeanImage => &["in_file", "in_mask"],
        }
    }

    pub fn output_names(&self) -> &'static [&'static str] {
        match self {
            Helper::CheckInitXfms => &["init_xfms"],
            Helper::RecomposeXfm => &["out_files"],
            _ => &["out_file"],
        }
    }
}

impl fmt::Display for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Helper {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        Helper::ALL.into_iter().find(|h| h.name() == s).ok_or_else(|| {
            PrepError::interface(
                "Function",
                format!(
                    "unknown helper '{}' (available: {})",
                    s,
                    Helper::ALL.map(|h| h.name()).join(", ")
                ),
            )
        })
    }
}

/// 綁定到某個 [`Helper`] 的節點
///
/// The helper is stored by name, the way a declaration file would name it,
/// and is resolved against [`Helper`] when the workflow is validated.
#[derive(Debug, Clone)]
pub struct Function {
    function: String,
    input_spec: InterfaceSpec,
    output_spec: InterfaceSpec,
    inputs: BTreeMap<String, FieldValue>,
}

impl Function {
    pub fn new(function: &str, input_names: &[&str], output_names: &[&str]) -> Self {
        Self {
            function: function.to_string(),
            input_spec: any_fields(input_names),
            output_spec: any_fields(output_names),
            inputs: BTreeMap::new(),
        }
    }

    /// 欄位直接取自 helper 的簽名
    pub fn from_helper(helper: Helper) -> Self {
        Self::new(helper.name(), helper.input_names(), helper.output_names())
    }

    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.inputs.insert(field.to_string(), value.into());
        self
    }

    /// 名稱必須是已知 helper，且輸入/輸出欄位與其簽名一致
    pub fn resolve(&self) -> Result<Helper> {
        let helper: Helper = self.function.parse()?;

        let inputs = self.input_spec.names();
        if inputs != helper.input_names() {
            return Err(PrepError::interface(
                "Function",
                format!("{} takes {:?}, declared with {:?}", helper, helper.input_names(), inputs),
            ));
        }
        let outputs = self.output_spec.names();
        if outputs != helper.output_names() {
            return Err(PrepError::interface(
                "Function",
                format!("{} returns {:?}, declared with {:?}", helper, helper.output_names(), outputs),
            ));
        }
        Ok(helper)
    }
}

impl Interface for Function {
    fn name(&self) -> &str {
        "Function"
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

    fn helper_name(&self) -> Option<&str> {
        Some(&self.function)
    }

    fn check_declaration(&self) -> Result<()> {
        self.resolve()?;
        match self.inputs.keys().find(|field| !self.input_spec.contains(field)) {
            Some(field) => Err(PrepError::interface(
                "Function",
                format!("{} has no input '{}'", self.function, field),
            )),
            None => Ok(()),
        }
    }
}
