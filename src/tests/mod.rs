mod test_dataset;
mod test_solver;
mod test_spectral;

use std::sync::Once;

use crate::config::{EigenSolver, SpectralParams};

static INIT: Once = Once::new();

/// Route `log` output through the test harness; `RUST_LOG` picks the level.
pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .is_test(true)
            .try_init();
    });
}

pub fn dense_params(max_k: usize) -> SpectralParams {
    SpectralParams::default()
        .with_max_k(max_k)
        .with_solver(EigenSolver::Dense)
}
