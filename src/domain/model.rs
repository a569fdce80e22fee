use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 在節點之間流動的欄位值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    File(PathBuf),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_defined(&self) -> bool {
        !matches!(self, FieldValue::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// 字串或檔案路徑
    pub fn as_path(&self) -> Option<PathBuf> {
        match self {
            FieldValue::File(p) => Some(p.clone()),
            FieldValue::Str(s) => Some(PathBuf::from(s)),
            _ => None,
        }
    }

    /// 單一值視為長度 1 的串列
    pub fn to_paths(&self) -> Option<Vec<PathBuf>> {
        match self {
            FieldValue::List(items) => items.iter().map(FieldValue::as_path).collect(),
            other => other.as_path().map(|p| vec![p]),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Undefined => write!(f, "<undefined>"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            // 與 Python 的 str(float) 一致：整數值保留一位小數
            FieldValue::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{:.1}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Str(s) => write!(f, "{}", s),
            FieldValue::File(p) => write!(f, "{}", p.display()),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<PathBuf> for FieldValue {
    fn from(v: PathBuf) -> Self {
        FieldValue::File(v)
    }
}

impl From<&std::path::Path> for FieldValue {
    fn from(v: &std::path::Path) -> Self {
        FieldValue::File(v.to_path_buf())
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        FieldValue::List(v.into_iter().map(Into::into).collect())
    }
}
