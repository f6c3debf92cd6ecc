//! Worker system: everything one CI worker process executes.
//!
//! Core components:
//! - `heartbeat`: periodic liveness output for the CI platform
//! - `environment`: runtime version switch, dependency reset and install
//! - `tasks`: fixed pre-test task list, round-robin across workers
//! - `runner`: sequential, fail-fast execution of the worker's test shard

pub mod environment;
pub mod heartbeat;
pub mod runner;
pub mod tasks;

pub use environment::EnvironmentSetup;
pub use heartbeat::{Heartbeat, HeartbeatHandle};
pub use runner::TestRunner;
pub use tasks::{Step, StepOutcome, Task, TaskList, TaskOutcome, TaskRunner};
