//! Team and user rows.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use reviewer_core::{RepositoryError, Team, TeamMember, User, UserId};

use super::{is_unique_violation, storage_err, to_millis, SqliteRepository};

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::from(row.get::<_, String>(0)?),
        username: row.get(1)?,
        team_name: row.get(2)?,
        is_active: row.get(3)?,
    })
}

fn load_user_sync(conn: &Connection, id: &str) -> Result<Option<User>, RepositoryError> {
    conn.query_row(
        "SELECT user_id, username, team_name, is_active FROM users WHERE user_id = ?1",
        params![id],
        user_from_row,
    )
    .optional()
    .map_err(storage_err("get_user"))
}

/// A team is known if its row exists or any user still points at it.
fn team_known_sync(conn: &Connection, team_name: &str) -> Result<bool, RepositoryError> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = ?1)
             OR EXISTS(SELECT 1 FROM users WHERE team_name = ?1)",
        params![team_name],
        |row| row.get(0),
    )
    .map_err(storage_err("team_known"))
}

fn insert_team_sync(conn: &mut Connection, team: &Team) -> Result<(), RepositoryError> {
    let now = to_millis(Utc::now());
    let tx = conn.transaction().map_err(storage_err("create_team begin"))?;

    tx.execute(
        "INSERT INTO teams (team_name, created_at) VALUES (?1, ?2)",
        params![team.team_name, now],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            RepositoryError::duplicate("team", team.team_name.as_str())
        } else {
            RepositoryError::storage("create_team", e.to_string())
        }
    })?;

    for member in &team.members {
        tx.execute(
            "INSERT INTO users (user_id, username, team_name, is_active, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 username = excluded.username,
                 team_name = excluded.team_name,
                 is_active = excluded.is_active,
                 updated_at = excluded.updated_at",
            params![
                member.user_id.as_str(),
                member.username,
                team.team_name,
                member.is_active,
                now
            ],
        )
        .map_err(storage_err("create_team member"))?;
    }

    tx.commit().map_err(storage_err("create_team commit"))
}

fn load_team_sync(conn: &Connection, team_name: &str) -> Result<Option<Team>, RepositoryError> {
    if !team_known_sync(conn, team_name)? {
        return Ok(None);
    }

    let mut stmt = conn
        .prepare(
            "SELECT user_id, username, is_active FROM users
             WHERE team_name = ?1 ORDER BY username, user_id",
        )
        .map_err(storage_err("get_team"))?;
    let members = stmt
        .query_map(params![team_name], |row| {
            Ok(TeamMember {
                user_id: UserId::from(row.get::<_, String>(0)?),
                username: row.get(1)?,
                is_active: row.get(2)?,
            })
        })
        .map_err(storage_err("get_team"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(storage_err("get_team row"))?;

    Ok(Some(Team {
        team_name: team_name.to_string(),
        members,
    }))
}

// =============================================================================
// Async implementations
// =============================================================================

impl SqliteRepository {
    pub(super) async fn get_user_impl(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let id = id.to_string();
        self.with_conn("get_user", move |conn| load_user_sync(conn, &id))
            .await
    }

    pub(super) async fn active_teammates_impl(
        &self,
        team_name: &str,
        exclude: &UserId,
    ) -> Result<Vec<User>, RepositoryError> {
        let team_name = team_name.to_string();
        let exclude = exclude.to_string();
        self.with_conn("active_teammates", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT user_id, username, team_name, is_active FROM users
                     WHERE team_name = ?1 AND is_active = 1 AND user_id != ?2
                     ORDER BY user_id",
                )
                .map_err(storage_err("active_teammates"))?;
            let users = stmt
                .query_map(params![team_name, exclude], user_from_row)
                .map_err(storage_err("active_teammates"))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(storage_err("active_teammates row"))?;
            Ok(users)
        })
        .await
    }

    pub(super) async fn team_exists_impl(&self, team_name: &str) -> Result<bool, RepositoryError> {
        let team_name = team_name.to_string();
        self.with_conn("team_exists", move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM teams WHERE team_name = ?1)",
                params![team_name],
                |row| row.get(0),
            )
            .map_err(storage_err("team_exists"))
        })
        .await
    }

    pub(super) async fn create_team_impl(&self, team: &Team) -> Result<(), RepositoryError> {
        let team = team.clone();
        self.with_conn("create_team", move |conn| insert_team_sync(conn, &team))
            .await
    }

    pub(super) async fn get_team_impl(
        &self,
        team_name: &str,
    ) -> Result<Option<Team>, RepositoryError> {
        let team_name = team_name.to_string();
        self.with_conn("get_team", move |conn| load_team_sync(conn, &team_name))
            .await
    }

    pub(super) async fn set_user_active_impl(
        &self,
        id: &UserId,
        is_active: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let id = id.to_string();
        let now = to_millis(Utc::now());
        self.with_conn("set_user_active", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE users SET is_active = ?2, updated_at = ?3 WHERE user_id = ?1",
                    params![id, is_active, now],
                )
                .map_err(storage_err("set_user_active"))?;
            if updated == 0 {
                return Ok(None);
            }
            load_user_sync(conn, &id)
        })
        .await
    }

    pub(super) async fn deactivate_team_impl(
        &self,
        team_name: &str,
    ) -> Result<bool, RepositoryError> {
        let team_name = team_name.to_string();
        let now = to_millis(Utc::now());
        self.with_conn("deactivate_team", move |conn| {
            let tx = conn
                .transaction()
                .map_err(storage_err("deactivate_team begin"))?;
            if !team_known_sync(&tx, &team_name)? {
                return Ok(false);
            }
            tx.execute(
                "UPDATE users SET is_active = 0, updated_at = ?2 WHERE team_name = ?1",
                params![team_name, now],
            )
            .map_err(storage_err("deactivate_team"))?;
            tx.commit().map_err(storage_err("deactivate_team commit"))?;
            Ok(true)
        })
        .await
    }
}
