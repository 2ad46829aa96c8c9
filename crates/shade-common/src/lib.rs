pub mod event;
pub mod protocol;

pub use event::{MfaKind, VerifiedEvent};
pub use protocol::{AgentRequest, AgentResponse, LoginDetected};
