use anyhow::{Context, Result};
use log::info;

use tlkernel::{
    config::{ExperimentConfig, SplitMode},
    dataset::DataClass,
    grid::{grid, run_testset},
    solver::LabelPropagation,
};

const CONFIG_ENV: &str = "TLKERNEL_CONFIG";

fn load_config() -> Result<ExperimentConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => ExperimentConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {:?}", path)),
        None => Ok(ExperimentConfig::new()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let evaluator = LabelPropagation::new(config.solver.clone());
    let mode = std::env::args().nth(1).unwrap_or_default();

    if mode == "grid" {
        let source = DataClass::from_config(&config.dataset, config.kernel.clone(), SplitMode::Validation)
            .context("building validation data")?;
        let report = grid(&source, &evaluator, &config)?;
        for record in &report.records {
            println!("{}", record);
        }
        println!("{}", report.summary());
    } else {
        let source = DataClass::from_config(&config.dataset, config.kernel.clone(), SplitMode::Test)
            .context("building test data")?;
        let params = config.test_params;
        let metrics = run_testset(&source, &evaluator, &config, params)?;
        println!(
            "log2_b {:3} log2_w {:3} log2_p {:3} {}",
            params.log2_b, params.log2_w, params.log2_p, metrics
        );
    }

    info!("done");
    Ok(())
}
