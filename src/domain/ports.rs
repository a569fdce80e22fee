use crate::domain::model::FieldValue;
use crate::interfaces::command::CommandLineTool;
use crate::interfaces::spec::InterfaceSpec;
use crate::utils::error::{PrepError, Result};
use std::collections::BTreeMap;

/// 節點背後的介面：描述輸入/輸出欄位並持有已設定的輸入值
pub trait Interface: Send + Sync + std::fmt::Debug {
    /// 介面名稱，例如 `FLIRT`
    fn name(&self) -> &str;

    fn input_spec(&self) -> &InterfaceSpec;

    fn output_spec(&self) -> &InterfaceSpec;

    fn inputs(&self) -> &BTreeMap<String, FieldValue>;

    fn inputs_mut(&mut self) -> &mut BTreeMap<String, FieldValue>;

    /// 外部工具包裝才有命令列
    fn as_command(&self) -> Option<&CommandLineTool> {
        None
    }

    /// Function 節點呼叫的 helper 名稱
    fn helper_name(&self) -> Option<&str> {
        None
    }

    /// 不需要連線資訊就能做的檢查：欄位名稱、helper 綁定
    fn check_declaration(&self) -> Result<()> {
        match self.as_command() {
            Some(tool) => tool.check_inputs(),
            None => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        if self.as_command().is_some() {
            "command"
        } else {
            "utility"
        }
    }

    fn set_input(&mut self, field: &str, value: FieldValue) -> Result<()> {
        if !self.input_spec().contains(field) {
            return Err(PrepError::interface(
                self.name(),
                format!("unknown input '{}'", field),
            ));
        }
        self.inputs_mut().insert(field.to_string(), value);
        Ok(())
    }

    fn input(&self, field: &str) -> Option<&FieldValue> {
        self.inputs().get(field).filter(|v| v.is_defined())
    }
}
