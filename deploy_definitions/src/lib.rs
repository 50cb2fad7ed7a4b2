#![allow(renamed_and_removed_lints)]
#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

#[macro_use]
extern crate failure;

extern crate chrono;

/// The error taxonomy plus the `failure`-crate plumbing shared by the
/// whole workspace.
pub mod error;
pub use error::{DeployError, DeployErrorKind, Result};

/// Selects namespace fan-out, strategy defaults and risk posture.
pub mod environment;
pub use environment::Environment;

/// `Chart` and the fixed stateful-chart set.
pub mod chart;
pub use chart::{is_stateful_chart, Chart, ChartKind, STATEFUL_CHARTS};

/// `Layer`, a.k.a. wave.
pub mod layer;
pub use layer::Layer;

/// `DeploymentOptions` and `Strategy`.
pub mod options;
pub use options::{DeploymentOptions, Strategy, DEFAULT_CHART_TIMEOUT, STATEFUL_CHART_TIMEOUT};

/// `DeploymentResult` and `DeploymentProgress`.
pub mod progress;
pub use progress::{DeployStatus, DeploymentProgress, DeploymentResult};

/// `ReleaseInfo` and `Checkpoint`.
pub mod release;
pub use release::{Checkpoint, ReleaseInfo, ReleaseKey, ReleaseStatus};

/// `TlsMaterial`.
pub mod tls;
pub use tls::TlsMaterial;
