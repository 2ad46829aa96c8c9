//! Page-embedded half of shade: watches a login page, decides whether a
//! submission really signed the user in, and hands the result to the local
//! coordinator.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod context;
pub mod correlation;
pub mod debounce;
pub mod link;
pub mod observer;
pub mod outcome;
pub mod page;

pub use classifier::{FieldDescriptor, InputRole, classify};
pub use config::{AgentConfig, OutcomeConfig};
pub use context::PageContext;
pub use correlation::{AttemptHandle, AttemptOutcome, AttemptState, DiscardReason, Dispatched};
pub use link::{CoordinatorLink, EventSink, LinkError};
pub use page::{Document, NodeId, NodeSpec, Page, PageEvent};
