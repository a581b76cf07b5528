#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod enrollment_service;
pub mod error;
pub mod hierarchy_reader;
pub mod locks;
pub mod progress_service;
pub mod quiz_service;
pub mod retry;
mod unit_of_work;

pub use progress_core::Clock;

pub use config::{ConfigError, EngineConfig};
pub use engine::{ProgressEngine, QuizOutcome};
pub use enrollment_service::EnrollmentService;
pub use error::{EngineError, EngineInitError, ErrorKind};
pub use hierarchy_reader::HierarchyReader;
pub use locks::CourseLocks;
pub use progress_service::{CourseProgress, ProgressService};
pub use quiz_service::{QuizService, ScoredAttempt};
pub use retry::RetryPolicy;
