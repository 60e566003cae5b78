//! Optimizers for training the segmentation network.
//!
//! Wraps burn's optimizers behind a small trait so the training loop owns
//! the learning rate.
//!
//! # Examples
//!
//! ```rust,ignore
//! use volseg_train::optimizer::{AdamOptimizer, Optimizer};
//!
//! let mut optimizer = AdamOptimizer::new(5e-5);
//! let model = optimizer.step(model, grads);
//! ```

pub mod adam;
pub mod trait_;

pub use adam::AdamOptimizer;
pub use trait_::Optimizer;
