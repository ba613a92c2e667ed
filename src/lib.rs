//! Regression batch runner.
//!
//! A line-oriented config file becomes a [`plan::TestPlan`]; the
//! [`orchestrator::JobOrchestrator`] runs every job's executor, compares the
//! computed results against baselines, and [`report`] folds the per-file
//! reports into one summary.

pub mod cleanup;
pub mod cli;
pub mod compare;
pub mod config;
pub mod email;
pub mod error;
pub mod executor;
pub mod git;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod plot;
pub mod report;
pub mod state_machine;
pub mod ui;
