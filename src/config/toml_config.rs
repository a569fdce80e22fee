use crate::app::pipelines::{EccParams, HmcParams, PipelineParams, SdcParams};
use crate::utils::error::{PrepError, Result};
use crate::utils::validation::{validate_path, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// dmri-prep 的 TOML 設定；所有區段皆可省略
///
/// ```toml
/// [output]
/// dir = "${WORK_DIR}/derivatives"
///
/// [hmc]
/// dof = 6
/// search_range = [-4, 4]
///
/// [sdc]
/// delta_te = 2.46e-3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    pub output: OutputConfig,
    pub hmc: HmcParams,
    pub ecc: EccParams,
    pub sdc: SdcParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// helper 輸出檔案的目錄
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
        }
    }
}

impl PrepConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| PrepError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${WORK_DIR})；未定義的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| PrepError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.dir)
    }

    pub fn pipeline_params(&self) -> PipelineParams {
        PipelineParams {
            hmc: self.hmc.clone(),
            ecc: self.ecc.clone(),
            sdc: self.sdc.clone(),
        }
    }
}

impl Validate for PrepConfig {
    fn validate(&self) -> Result<()> {
        validate_path("output.dir", &self.output.dir)?;
        self.hmc.validate()?;
        self.ecc.validate()?;
        self.sdc.validate()
    }
}
