//! Extension hooks.
//!
//! Extensions observe panel activity after the controller has applied it to
//! the model. Every hook has a default empty body, so an extension
//! implements only what it cares about. Discovery is the embedder's
//! problem: build the list and hand it to the controller.

use nx_model::{LogEvent, Partition, System, Zone};

/// Callbacks invoked by the controller loop, in registration order, after
/// each model mutation. Implementations must not block: they run on the
/// controller task.
pub trait PanelExtension: Send + Sync {
    fn zone_status(&self, _zone: &Zone) {}
    fn partition_status(&self, _partition: &Partition) {}
    fn device_command(&self, _house: char, _unit: u8, _command: &str) {}
    fn system_status(&self, _system: &System) {}
    fn log_event(&self, _event: &LogEvent) {}
}
