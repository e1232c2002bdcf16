//! Team and user administration on top of [`DirectoryAdmin`].

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{DirectoryError, RepositoryError};
use crate::model::{Team, User, UserId};
use crate::repository::DirectoryAdmin;

pub struct DirectoryService {
    admin: Arc<dyn DirectoryAdmin>,
}

impl DirectoryService {
    pub fn new(admin: Arc<dyn DirectoryAdmin>) -> Self {
        Self { admin }
    }

    /// Create a team and upsert its members onto it.
    ///
    /// Members that already exist elsewhere are moved to this team with the
    /// username and active flag given here.
    pub async fn create_team(&self, team: Team) -> Result<Team, DirectoryError> {
        if self.admin.team_exists(&team.team_name).await? {
            return Err(DirectoryError::TeamExists(team.team_name));
        }

        match self.admin.create_team(&team).await {
            Ok(()) => {}
            Err(RepositoryError::Duplicate { .. }) => {
                return Err(DirectoryError::TeamExists(team.team_name));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "Created team {} with {} member(s)",
            team.team_name,
            team.members.len()
        );
        self.get_team(&team.team_name).await
    }

    pub async fn get_team(&self, team_name: &str) -> Result<Team, DirectoryError> {
        self.admin
            .get_team(team_name)
            .await?
            .ok_or_else(|| DirectoryError::TeamNotFound(team_name.to_string()))
    }

    pub async fn set_user_active(
        &self,
        user_id: UserId,
        is_active: bool,
    ) -> Result<User, DirectoryError> {
        let user = self
            .admin
            .set_user_active(&user_id, is_active)
            .await?
            .ok_or(DirectoryError::UserNotFound(user_id))?;
        info!("User {} is_active={}", user.id, user.is_active);
        Ok(user)
    }

    /// Mark every member of the team inactive.
    pub async fn deactivate_team(&self, team_name: &str) -> Result<(), DirectoryError> {
        if !self.admin.deactivate_team(team_name).await? {
            warn!("Cannot deactivate unknown team {}", team_name);
            return Err(DirectoryError::TeamNotFound(team_name.to_string()));
        }
        info!("Deactivated all members of team {}", team_name);
        Ok(())
    }
}
