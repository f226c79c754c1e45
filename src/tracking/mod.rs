//! Experiment Tracking Module
//!
//! Records training runs (parameters, metrics, artifacts) behind the
//! [`Tracker`] trait. Two backends:
//! - [`FileTracker`]: local directory store, the default (`file:./mlruns`)
//! - [`HttpTracker`]: an MLflow tracking server over its REST API

mod http;
mod storage;
mod tracker;

pub use http::HttpTracker;
pub use storage::{ExperimentRecord, FileTracker};
pub use tracker::{Metric, RunRecord, RunStatus, Tracker, TrackingUri};
