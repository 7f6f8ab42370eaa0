//! Dependency installation for stowage.
//!
//! This crate knows how to check whether an external tool is present and how
//! to install it on the supported Linux families:
//! - Per-tool, per-family installation strategies.
//! - Step execution with bounded timeouts and typed outcomes.
//! - Post-install hooks for tools that need a bootstrap step.
//! - Download helper for repository signing keys.

mod fetch;
mod hooks;
mod installer;
mod result;
mod strategy;

/// Download helper with timeout/retry policy.
pub use fetch::{FetchError, Fetcher, HttpFetcher};
/// Post-install hook contract.
pub use hooks::{HookOutcome, PostInstallHook};
/// The installer and its progress reporting types.
pub use installer::{InstallProgress, InstallReport, Installer, ProgressSink};
/// Tagged installation outcome.
pub use result::{InstallDetails, InstallResult};
/// Installation strategies per OS family.
pub use strategy::{InstallPlan, InstallStep, StepTimeouts, manual_instructions, plan_for};
