#![forbid(unsafe_code)]

pub mod app_services;
pub mod attempts;
pub mod error;
pub mod navigation;
pub mod question_service;

pub use exam_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, AttemptError, QuestionServiceError};
pub use navigation::{NavigationGuard, NoopGuard, RecordingGuard};
pub use question_service::QuestionService;

pub use attempts::{
    AttemptFinalizer, AttemptLoopService, AttemptPhase, AttemptSession, AttemptView, FinishCause,
    Pending, QuestionView, RetakeController, Transition,
};
