mod finalizer;
mod recovery;
mod retake;
mod session;
mod view;
mod workflow;

// Public API of the attempt subsystem.
pub use crate::error::AttemptError;
pub use finalizer::{AttemptFinalizer, FinishCause};
pub use recovery::{Recovery, recover};
pub use retake::RetakeController;
pub use session::{AttemptPhase, AttemptSession, Pending, Transition};
pub use view::{AttemptView, QuestionView};
pub use workflow::AttemptLoopService;
