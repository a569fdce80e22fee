use crate::app::functions::DEFAULT_MAX_B;
use crate::app::pipelines::PipelineKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "dmri-prep")]
#[command(about = "Diffusion MRI preprocessing workflows and helpers")]
pub struct CliConfig {
    #[arg(long, global = true, help = "TOML file with [output], [hmc], [ecc] and [sdc] sections")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory for files written by helpers")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DescribeFormat {
    Text,
    Json,
    Dot,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// 檢查並列出一個 workflow
    Describe {
        /// hmc, ecc, sdc or cleanup
        pipeline: PipelineKind,
        #[arg(long, value_enum, default_value_t = DescribeFormat::Text)]
        format: DescribeFormat,
    },
    /// 以 JSON 輸出工具的輸入/輸出欄位
    Interface { name: String },
    /// 產生 gennlxfm 命令列（--verbose 也會傳給 gennlxfm）
    Gennlxfm {
        #[arg(long)]
        like: PathBuf,
        #[arg(long)]
        step: Option<i64>,
        #[arg(long)]
        ident: bool,
        #[arg(long)]
        no_clobber: bool,
        #[arg(long)]
        output_file: Option<PathBuf>,
    },
    /// 依配準矩陣旋轉 b-vectors
    RotateBvecs {
        #[arg(long)]
        bvec: PathBuf,
        #[arg(long, num_args = 1.., required = true)]
        matrices: Vec<PathBuf>,
    },
    /// 平均 b0 volumes
    B0Average {
        #[arg(long)]
        dwi: PathBuf,
        #[arg(long)]
        bval: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MAX_B)]
        max_b: f64,
    },
    /// 列出每個矩陣的 Jacobian 行列式
    Jacobian {
        #[arg(required = true)]
        matrices: Vec<PathBuf>,
    },
    /// 寫出每個 volume 的 eccorr_%04d.mat
    RecomposeXfm {
        #[arg(long)]
        bval: PathBuf,
        #[arg(long, num_args = 1.., required = true)]
        xfms: Vec<PathBuf>,
    },
    /// 以校正後的 volumes 重組 DWI
    RecomposeDwi {
        #[arg(long)]
        dwi: PathBuf,
        #[arg(long)]
        bval: PathBuf,
        #[arg(long, num_args = 1.., required = true)]
        corrected: Vec<PathBuf>,
    },
    /// 減去遮罩內的中位數
    Demean {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        mask: Option<PathBuf>,
    },
    /// Siemens 相位影像轉為弧度
    Siemens2rads {
        #[arg(required = true, num_args = 1..=2)]
        phase: Vec<PathBuf>,
    },
    /// 弧度轉為 rad/s
    Rads2radsec {
        #[arg(long)]
        input: PathBuf,
        /// 預設使用設定檔的 sdc.delta_te
        #[arg(long)]
        delta_te: Option<f64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_parses_kind_and_format() {
        let cli = CliConfig::try_parse_from(["dmri-prep", "describe", "ecc", "--format", "dot"]).unwrap();
        match cli.command {
            Command::Describe { pipeline, format } => {
                assert_eq!(pipeline, PipelineKind::Ecc);
                assert_eq!(format, DescribeFormat::Dot);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = CliConfig::try_parse_from([
            "dmri-prep",
            "gennlxfm",
            "--like",
            "t1.mnc",
            "--step",
            "4",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Gennlxfm { step: Some(4), .. }));
    }

    #[test]
    fn test_siemens2rads_takes_at_most_two_files() {
        assert!(CliConfig::try_parse_from(["dmri-prep", "siemens2rads", "a.nii", "b.nii", "c.nii"]).is_err());
        assert!(CliConfig::try_parse_from(["dmri-prep", "describe", "topup"]).is_err());
    }
}
