#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    QuestionBank, QuestionImport, ResultSink, SessionSlot, SessionStore, Storage, StorageError,
};
