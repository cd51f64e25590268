//! Value types shared by the graph model, plan, state machine, and engine.

use std::collections::HashMap;

use serde_json::Value;

mod error_info;
mod event;
mod handles;
mod retry_mode;
mod run;
mod runtime_type;
mod step_outcome;

pub use error_info::ErrorInfo;
pub use event::{Event, EventKind, EventType};
pub use handles::{SolidHandle, StepOutputHandle};
pub use retry_mode::RetryMode;
pub use run::{Run, RunStatus};
pub use runtime_type::{RuntimeType, TypeCheckFailure};
pub use step_outcome::StepOutcome;

/// Resolved input values handed to a compute function, keyed by input name.
///
/// Fan-in inputs arrive as a JSON array holding only the produced members.
pub type InputValues = HashMap<String, Value>;
