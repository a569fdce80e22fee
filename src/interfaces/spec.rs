//! 介面欄位的宣告與其 metadata
//!
//! Every field of a tool wrapper carries the same metadata vocabulary the
//! command-line builder consumes: `argstr`, `position`, `usedefault`,
//! `genfile`, `name_source`/`name_template` and friends. The vocabulary is
//! queryable by key through [`TraitSpec::metadata`], so tests can assert on
//! a tool's declared surface with plain expected maps.

use crate::domain::model::FieldValue;
use serde::Serialize;

/// 欄位型別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitKind {
    File,
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
    Any,
}

/// 單一 metadata 的值
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Str(String),
    StrList(Vec<String>),
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<Vec<&str>> for MetaValue {
    fn from(v: Vec<&str>) -> Self {
        MetaValue::StrList(v.into_iter().map(str::to_string).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitSpec {
    pub kind: TraitKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argstr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usedefault: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nohash: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genfile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_files: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_source: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_extension: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mandatory: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sep: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xor: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl TraitSpec {
    pub fn new(kind: TraitKind) -> Self {
        Self {
            kind,
            argstr: None,
            position: None,
            usedefault: None,
            default: None,
            nohash: None,
            genfile: None,
            hash_files: None,
            name_source: None,
            name_template: None,
            keep_extension: None,
            mandatory: None,
            sep: None,
            xor: None,
            requires: None,
            desc: None,
        }
    }

    pub fn file() -> Self {
        Self::new(TraitKind::File)
    }

    pub fn flag() -> Self {
        Self::new(TraitKind::Bool)
    }

    pub fn int() -> Self {
        Self::new(TraitKind::Int)
    }

    pub fn float() -> Self {
        Self::new(TraitKind::Float)
    }

    pub fn string() -> Self {
        Self::new(TraitKind::Str)
    }

    pub fn list() -> Self {
        Self::new(TraitKind::List)
    }

    pub fn any() -> Self {
        Self::new(TraitKind::Any)
    }

    pub fn argstr(mut self, argstr: &str) -> Self {
        self.argstr = Some(argstr.to_string());
        self
    }

    pub fn position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    /// 未設定時採用預設值
    pub fn usedefault(mut self, default: impl Into<FieldValue>) -> Self {
        self.usedefault = Some(true);
        self.default = Some(default.into());
        self
    }

    pub fn nohash(mut self) -> Self {
        self.nohash = Some(true);
        self
    }

    pub fn genfile(mut self) -> Self {
        self.genfile = Some(true);
        self
    }

    pub fn hash_files(mut self, hash: bool) -> Self {
        self.hash_files = Some(hash);
        self
    }

    pub fn name_source(mut self, sources: &[&str]) -> Self {
        self.name_source = Some(sources.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn name_template(mut self, template: &str) -> Self {
        self.name_template = Some(template.to_string());
        self
    }

    pub fn keep_extension(mut self) -> Self {
        self.keep_extension = Some(true);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = Some(true);
        self
    }

    pub fn sep(mut self, sep: &str) -> Self {
        self.sep = Some(sep.to_string());
        self
    }

    pub fn xor(mut self, fields: &[&str]) -> Self {
        self.xor = Some(fields.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn requires(mut self, fields: &[&str]) -> Self {
        self.requires = Some(fields.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn desc(mut self, desc: &str) -> Self {
        self.desc = Some(desc.to_string());
        self
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory.unwrap_or(false)
    }

    pub fn is_genfile(&self) -> bool {
        self.genfile.unwrap_or(false)
    }

    /// 依名稱查詢 metadata；未設定的 key 回傳 `None`
    pub fn metadata(&self, key: &str) -> Option<MetaValue> {
        match key {
            "argstr" => self.argstr.as_deref().map(MetaValue::from),
            "position" => self.position.map(MetaValue::from),
            "usedefault" => self.usedefault.map(MetaValue::Bool),
            "nohash" => self.nohash.map(MetaValue::Bool),
            "genfile" => self.genfile.map(MetaValue::Bool),
            "hash_files" => self.hash_files.map(MetaValue::Bool),
            "name_source" => self.name_source.clone().map(MetaValue::StrList),
            "name_template" => self.name_template.as_deref().map(MetaValue::from),
            "keep_extension" => self.keep_extension.map(MetaValue::Bool),
            "mandatory" => self.mandatory.map(MetaValue::Bool),
            "sep" => self.sep.as_deref().map(MetaValue::from),
            "xor" => self.xor.clone().map(MetaValue::StrList),
            "requires" => self.requires.clone().map(MetaValue::StrList),
            "desc" => self.desc.as_deref().map(MetaValue::from),
            _ => None,
        }
    }
}

/// 有序的欄位表
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InterfaceSpec {
    fields: Vec<(String, TraitSpec)>,
}

impl InterfaceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增或覆寫欄位
    pub fn field(mut self, name: &str, spec: TraitSpec) -> Self {
        self.insert(name, spec);
        self
    }

    pub fn insert(&mut self, name: &str, spec: TraitSpec) {
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| n == name) {
            slot.1 = spec;
        } else {
            self.fields.push((name.to_string(), spec));
        }
    }

    pub fn get(&self, name: &str) -> Option<&TraitSpec> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn traits(&self) -> impl Iterator<Item = (&str, &TraitSpec)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 所有命令列工具共用的輸入欄位
pub fn command_line_inputs() -> InterfaceSpec {
    InterfaceSpec::new()
        .field(
            "args",
            TraitSpec::string()
                .argstr("%s")
                .desc("Additional parameters to the command"),
        )
        .field(
            "environ",
            TraitSpec::new(TraitKind::Dict)
                .nohash()
                .usedefault(FieldValue::List(Vec::new()))
                .desc("Environment variables"),
        )
        .field(
            "ignore_exception",
            TraitSpec::flag()
                .nohash()
                .usedefault(false)
                .desc("Print an error message instead of throwing an exception in case the interface fails to run"),
        )
        .field(
            "terminal_output",
            TraitSpec::string()
                .nohash()
                .desc("Control terminal output: stream, allatonce, file or none"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_lookup_by_key() {
        let spec = TraitSpec::file()
            .argstr("%s")
            .genfile()
            .hash_files(false)
            .name_source(&["like"])
            .name_template("%s_out.xfm")
            .position(-1);

        assert_eq!(spec.metadata("argstr"), Some(MetaValue::from("%s")));
        assert_eq!(spec.metadata("position"), Some(MetaValue::Int(-1)));
        assert_eq!(spec.metadata("hash_files"), Some(MetaValue::Bool(false)));
        assert_eq!(spec.metadata("name_source"), Some(MetaValue::from(vec!["like"])));
        assert_eq!(spec.metadata("mandatory"), None);
        assert_eq!(spec.metadata("no_such_key"), None);
    }

    #[test]
    fn test_insert_overrides_in_place() {
        let spec = command_line_inputs().field("args", TraitSpec::string().argstr("-x %s"));
        assert_eq!(spec.len(), 4);
        assert_eq!(spec.names()[0], "args");
        assert_eq!(spec.get("args").unwrap().argstr.as_deref(), Some("-x %s"));
    }

    #[test]
    fn test_standard_inputs_are_not_hashed() {
        let spec = command_line_inputs();
        for name in ["environ", "ignore_exception", "terminal_output"] {
            assert_eq!(spec.get(name).unwrap().metadata("nohash"), Some(MetaValue::Bool(true)));
        }
        assert_eq!(spec.get("args").unwrap().metadata("nohash"), None);
    }
}
