// Dashboard controller task and its handle

mod engine;
mod handle;

pub use engine::{ConfigUpdate, DashboardController, DerivedUpdate, HealthSnapshot};
pub use handle::{command_channel, run, Command, ControllerHandle, Inbound};
