pub mod config;
pub mod http;
pub mod repository;

use std::sync::Arc;

use reviewer_core::{
    DirectoryService, EngineConfig, HealthProbe, Repository, ReviewerAssignmentEngine, Statistics,
};

/// Shared state handed to every handler.
pub struct AppState {
    pub engine: ReviewerAssignmentEngine,
    pub directory: DirectoryService,
    pub statistics: Arc<dyn Statistics>,
    pub health: Arc<dyn HealthProbe>,
}

impl AppState {
    /// Wire every service onto one storage backend.
    pub fn new<R: Repository + 'static>(repo: Arc<R>, engine_config: EngineConfig) -> Self {
        Self {
            engine: ReviewerAssignmentEngine::from_repository(repo.clone(), engine_config),
            directory: DirectoryService::new(repo.clone()),
            statistics: repo.clone(),
            health: repo,
        }
    }
}
