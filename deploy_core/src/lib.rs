#![recursion_limit = "1024"]
#![allow(non_snake_case)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

extern crate chrono;
extern crate reqwest;

extern crate openssl;
extern crate rand;
extern crate rcgen;
extern crate time;

#[macro_use]
extern crate log;

extern crate threadpool;

#[cfg(feature = "filesystem")]
extern crate dirs;
#[cfg(feature = "filesystem")]
extern crate walkdir;

#[macro_use]
extern crate failure;

pub use deploy_definitions::Result;

/// Clock abstraction and the cooperative-cancellation `Ctx`.
pub mod clock;

/// Per-`(namespace, release)` operation locking.
pub mod lock_registry;

/// Package-manager and cluster adapter traits and their `helm`/`kubectl` implementations.
pub mod adapters;

/// Parses `helm list -o json` into `ReleaseInfo` (used by `adapters::package_manager`).
pub mod helm_json;

/// namespace resolution rule.
pub mod namespace;

/// strategy-to-install-flags table.
pub mod strategy;

/// Readiness probes dispatched by workload class.
pub mod prober;

/// Stateful workload recovery (pre-check + recreate).
pub mod recovery;

/// Credential validation and provisioning.
pub mod credentials;

/// TLS material acquisition, validation and distribution.
pub mod tls;

/// Wave planner.
pub mod planner;

/// Bounded worker pool for intra-layer parallel chart deployment.
pub mod workerpool;

/// Wave executor.
pub mod executor;

/// Checkpoint snapshot and rollback.
pub mod checkpoint;

/// Retry/recovery classifier.
pub mod retry;

/// Coordinator: sequences every phase of a deployment.
pub mod coordinator;

/// Chart catalogue loader, behind the `filesystem` feature.
#[cfg(feature = "filesystem")]
pub mod catalogue;

/// In-memory adapter doubles used across this crate's test modules.
#[cfg(test)]
pub mod testing;

pub use checkpoint::CheckpointManager;
pub use clock::{CancelHandle, Clock, Ctx, CtxError, SystemClock};
pub use coordinator::{Coordinator, CoordinatorConfig, RestartTarget, StatefulTarget, TlsServiceTarget};
pub use executor::{ChartKnowledge, DependencyWaiter, PermissiveCatalogue, WaveExecutor};
pub use lock_registry::LockRegistry;
pub use retry::RetryClassifier;

#[cfg(feature = "filesystem")]
pub use catalogue::ChartCatalogue;
