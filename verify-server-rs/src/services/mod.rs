pub mod collaborators;
pub mod control_plane;
pub mod notifier;
pub mod orchestrator;
pub mod poller;
pub mod runs;
