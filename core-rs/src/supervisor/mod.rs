// supervisor/mod.rs - Server process supervision and teardown

pub mod inspector;
pub mod process;
pub mod promise;
pub mod state;

pub use inspector::{find_orphans, ProcessEntry, ProcessInspector, SystemInspector};
pub use process::{ExitRecord, LaunchCommand, ProcessSupervisor, TeardownPlan};
pub use promise::{launch_promise, LaunchOutcome, LaunchPromise, LaunchPublisher};
pub use state::SupervisorState;
