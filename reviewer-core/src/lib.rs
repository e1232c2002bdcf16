pub mod directory;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod repository;
pub mod selection;

pub use directory::DirectoryService;
pub use engine::{EngineConfig, Reassignment, ReviewerAssignmentEngine};
pub use error::{AssignmentError, DirectoryError, ErrorKind, RepositoryError, WriteConflict};
pub use model::*;
pub use repository::{
    Directory, DirectoryAdmin, HealthProbe, InMemoryRepository, PullRequestStore, Repository,
    Statistics,
};
pub use selection::MAX_REVIEWERS;
