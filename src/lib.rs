//! # tlkernel
//!
//! Transfer-learning kernel adaptation between a source and a target domain.
//!
//! A combined kernel K over `[source | target]` instances is adapted by
//! replacing its cross-domain block with an exponential diffusion through both
//! within-domain spectra:
//!
//! ```text
//! K_st = (Q_s e^{βΛ_s} Q_sᵀ) · K_st · (Q_t e^{βΛ_t} Q_tᵀ)
//! ```
//!
//! The adapted kernel is optionally p-NN sparsified and handed to a
//! regularised label-propagation solver that scores a held-out set.
//!
//! ## Modules
//!
//! - [`spectral`]: top-k eigenpairs of the two diagonal blocks (dense EVD or Lanczos)
//! - [`reconstruct`]: exponential reconstruction of the cross block
//! - [`sparsification`]: symmetric p-nearest-neighbour sparsification
//! - [`grid`]: grid search driver and test-set runner
//! - [`dataset`]: svmlight loading and base kernel construction
//! - [`solver`], [`metrics`]: label propagation and AUC / AP / ranking loss
//! - [`config`], [`offsets`], [`error`], [`linalg`]: shared plumbing

pub mod config;
pub mod dataset;
pub mod error;
pub mod grid;
pub mod linalg;
pub mod metrics;
pub mod offsets;
pub mod reconstruct;
pub mod solver;
pub mod sparsification;
pub mod spectral;

#[cfg(test)]
mod tests;
