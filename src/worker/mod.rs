//! Worker side of the router boundary.
//!
//! Each agent runs in its own session task hosting a [`Reasoner`] and a
//! [`Toolbox`]. Sessions talk to the router only through protocol frames.

pub mod mailer;
pub mod reasoner;
pub mod runtime;
pub mod tools;

pub use mailer::{LogMailer, MailError, Mailer};
pub use reasoner::{EchoReasoner, Reasoner, ReasonerError};
pub use runtime::{spawn_worker, EventPort, EventSender, Turn};
pub use tools::{ToolOutput, Toolbox, TOOL_NAMES};
