mod attempt;
mod config;
mod ids;
mod question;
mod session;

pub use ids::{AttemptSeed, LearnerId, LessonId, ParseIdError, QuestionId};

pub use attempt::{InvalidReason, QuestionAnswer, TestAttempt, TestResult, round_percentage};
pub use config::{AttemptConfig, AttemptConfigError, ViolationPolicy};
pub use question::{Question, QuestionDraft, QuestionError, Role};
pub use session::{SessionSnapshot, SessionSnapshotError, SessionState};
