//! Request classification and prompt optimization.
//!
//! [`classify`] turns raw user text into a [`RequestClassification`];
//! [`PromptOptimizer`] combines that signal with side-context availability
//! and the [`DeviceProfile`](crate::device::DeviceProfile) into an
//! [`OptimizedPrompt`]. Both are pure functions of their inputs.

mod classifier;
mod prompt;

pub use classifier::classify;
pub use prompt::{OptimizedPrompt, OptimizerConfig, PromptOptimizer, device_adjusted_params};
