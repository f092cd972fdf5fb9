//! Load balancer membership reconciler.
//!
//! Keeps the registered-target set of cloud load balancers consistent with
//! the running, IP-bearing tasks of the jobs associated with them.
//!
//! ## Architecture
//!
//! - **Store**: associations and last confirmed target states
//!   ([`store::TargetStore`])
//! - **Calculator**: projects association and task events into target
//!   changes ([`calculator::TargetCalculator`])
//! - **Engine**: intake, windowing and batch dispatch
//!   ([`engine::LoadBalancerService`])
//! - **Applier**: partitioned register/deregister calls plus persistence
//!   ([`applier::BatchApplier`])
//! - **API**: HTTP surface over the engine ([`api::create_router`])

pub mod api;
pub mod applier;
pub mod batch;
pub mod calculator;
pub mod cloud;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod model;
pub mod state;
pub mod store;

pub use engine::{EngineConfig, LoadBalancerService, StatsSnapshot};
pub use error::{ApplyError, BatchError, ClientError, JobOperationsError, ReconcileError, StoreError};
