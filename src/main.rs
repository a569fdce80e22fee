use anyhow::Context;
use clap::Parser;
use dmri_prep::app::{functions, pipelines};
use dmri_prep::config::{CliConfig, Command, DescribeFormat, PrepConfig};
use dmri_prep::utils::{logger, text_io, validation::Validate};
use dmri_prep::{interfaces, Gennlxfm, PrepError};
use std::path::{Path, PathBuf};

fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting dmri-prep");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(&cli) {
        match e.downcast_ref::<PrepError>() {
            Some(prep_error) => {
                tracing::error!("❌ {} (Category: {:?})", e, prep_error.category());
                tracing::error!("💡 Recovery suggestion: {}", prep_error.recovery_suggestion());
                eprintln!("❌ {:#}", e);
                eprintln!("💡 建議: {}", prep_error.recovery_suggestion());
                std::process::exit(prep_error.exit_code());
            }
            None => {
                tracing::error!("❌ {:#}", e);
                eprintln!("❌ {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_config(cli: &CliConfig) -> anyhow::Result<PrepConfig> {
    let config = match &cli.config {
        Some(path) => PrepConfig::from_file(path)
            .with_context(|| format!("while loading {}", path.display()))?,
        None => PrepConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn output_dir(cli: &CliConfig, config: &PrepConfig) -> anyhow::Result<PathBuf> {
    let dir = cli.output_dir.clone().unwrap_or_else(|| config.output_dir());
    std::fs::create_dir_all(&dir).map_err(PrepError::from)?;
    Ok(dir)
}

fn print_path(label: &str, path: &Path) {
    tracing::info!("📁 {} written to {}", label, path.display());
    println!("{}", path.display());
}

fn run(cli: &CliConfig) -> anyhow::Result<()> {
    let config = load_config(cli)?;

    match &cli.command {
        Command::Describe { pipeline, format } => {
            let workflow = pipelines::build(*pipeline, &config.pipeline_params());
            match format {
                DescribeFormat::Text => print!("{}", workflow.summary()?),
                DescribeFormat::Json => println!("{}", serde_json::to_string_pretty(&workflow.summary()?)?),
                DescribeFormat::Dot => {
                    workflow.validate()?;
                    print!("{}", workflow.to_dot()?);
                }
            }
            tracing::info!("✅ Workflow {} is valid", workflow.name());
        }
        Command::Interface { name } => {
            let tool = interfaces::lookup(name).ok_or_else(|| PrepError::InterfaceError {
                interface: name.clone(),
                message: format!(
                    "no such tool; available: {}",
                    interfaces::REGISTERED_TOOLS.join(", ")
                ),
            })?;
            let described = serde_json::json!({
                "name": tool.name(),
                "kind": tool.kind(),
                "inputs": tool.input_spec(),
                "outputs": tool.output_spec(),
            });
            println!("{}", serde_json::to_string_pretty(&described)?);
        }
        Command::Gennlxfm {
            like,
            step,
            ident,
            no_clobber,
            output_file,
        } => {
            let mut gen = Gennlxfm::new()
                .like(like)
                .ident(*ident)
                .verbose(cli.verbose)
                .clobber(!no_clobber);
            if let Some(step) = step {
                gen = gen.step(*step);
            }
            if let Some(output_file) = output_file {
                gen = gen.output_file(output_file);
            }
            if let Some(dir) = &cli.output_dir {
                gen = gen.output_dir(dir);
            }
            println!("{}", gen.cmdline()?);
            for (name, value) in gen.list_outputs()? {
                tracing::info!("📄 {} = {}", name, value);
            }
        }
        Command::RotateBvecs { bvec, matrices } => {
            let out = functions::rotate_bvecs(bvec, matrices, &output_dir(cli, &config)?)?;
            print_path("Rotated b-vectors", &out);
        }
        Command::B0Average { dwi, bval, max_b } => {
            let out = functions::b0_average(dwi, bval, *max_b, &output_dir(cli, &config)?)?;
            print_path("Average b0", &out);
        }
        Command::Jacobian { matrices } => {
            for (path, jacobian) in matrices.iter().zip(functions::xfm_jacobian_files(matrices)?) {
                println!("{}\t{:.15}", path.display(), jacobian);
            }
        }
        Command::RecomposeXfm { bval, xfms } => {
            let bvals = text_io::load_vector(bval)?;
            let outs = functions::recompose_xfm(&bvals, xfms, &output_dir(cli, &config)?)?;
            tracing::info!("📁 Wrote {} matrices", outs.len());
            for out in outs {
                println!("{}", out.display());
            }
        }
        Command::RecomposeDwi { dwi, bval, corrected } => {
            let out = functions::recompose_dwi(dwi, bval, corrected, &output_dir(cli, &config)?)?;
            print_path("Corrected DWI", &out);
        }
        Command::Demean { input, mask } => {
            let out = functions::demean_image(input, mask.as_deref(), &output_dir(cli, &config)?)?;
            print_path("Demeaned image", &out);
        }
        Command::Siemens2rads { phase } => {
            let out = functions::siemens2rads(phase, &output_dir(cli, &config)?)?;
            print_path("Phase in radians", &out);
        }
        Command::Rads2radsec { input, delta_te } => {
            let delta_te = delta_te.unwrap_or(config.sdc.delta_te);
            let out = functions::rads2radsec(input, delta_te, &output_dir(cli, &config)?)?;
            print_path("Field map in rad/s", &out);
        }
    }

    Ok(())
}
