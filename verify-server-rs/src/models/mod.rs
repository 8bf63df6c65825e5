pub mod event;
pub mod session;

pub use event::{BackupCompletion, TriggerEvent};
pub use session::{resource_id, RestoreSession, RunState};
