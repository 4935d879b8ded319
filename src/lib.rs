// Armada - run tasks across a fleet of hosts
//
// Hosts come from an inventory, a runner decides how the task is scheduled
// over them, processors observe the run and every host yields one result.

pub mod config;
pub mod executor;
pub mod fleet;
pub mod inventory;
pub mod logging;
pub mod output;
pub mod plugins;
pub mod tasks;

pub use config::{FleetConfig, RunnerKind};
pub use executor::{Connection, Context, JobResult, Runner, Task, TaskOutput};
pub use fleet::{AsyncRun, Fleet};
pub use inventory::{Host, Inventory, InventoryPlugin};
pub use output::{ArmadaError, OutputFormat, RunSummary};

/// Version of the Armada tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::executor::{
        Context, JobResult, ParallelRunner, Runner, SortedRunner, Task, TaskMetadata, TaskOutput,
    };
    pub use crate::fleet::{AsyncRun, Fleet};
    pub use crate::inventory::{filter, FromHostList, FromYaml, Host, Inventory, InventoryPlugin};
    pub use crate::logging::{Logger, TracingLogger};
    pub use crate::output::ArmadaError;
    pub use crate::plugins::{Processor, Processors};
    pub use crate::tasks::{FnTask, LocalCommand, RemoteCommand, SshClose, SshOpen, TaskGroup};
}
