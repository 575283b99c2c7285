pub mod capability;
pub mod group_add;
pub mod invoker;
pub mod operation;
pub mod pacing;
pub mod sanitize;

pub use capability::CapabilityGate;
pub use group_add::{GroupAddError, GroupAddReport, GroupAddWorkflow, ParticipantResult, ParticipantStatus};
pub use invoker::{CallRequest, Invoker};
pub use operation::{Operation, Scope};
pub use pacing::InvitePacer;
