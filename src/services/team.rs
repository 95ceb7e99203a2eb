//! Team roster: everyone who shares a project with the current user.
//!
//! DESIGN
//! ======
//! The joined membership query returns one row per (member, project), so a
//! teammate on three projects appears three times. Rows are folded into one
//! entry per member id:
//! - the current user is always first and always `owner`
//! - a privileged row (owner/admin) replaces a plain member entry
//! - otherwise the first row seen wins
//!
//! Rows whose profile join came back empty are skipped.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BackendError, MemberRole, MembershipRow, Profile, SessionUser};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum TeamError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub role: MemberRole,
    #[serde(with = "time::serde::rfc3339::option")]
    pub joined_at: Option<OffsetDateTime>,
    /// Not tracked by the backend yet; always `None`.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_active: Option<OffsetDateTime>,
}

impl TeamMember {
    fn current(user: &SessionUser, profile: Option<&Profile>) -> Self {
        match profile {
            Some(profile) => Self {
                id: user.id,
                name: profile.name.clone(),
                email: profile.email.clone(),
                avatar_url: profile.avatar_url.clone(),
                role: MemberRole::Owner,
                joined_at: Some(profile.created_at),
                last_active: None,
            },
            None => Self {
                id: user.id,
                name: user.default_name(),
                email: user.email.clone().unwrap_or_default(),
                avatar_url: user.metadata.avatar_url.clone(),
                role: MemberRole::Owner,
                joined_at: None,
                last_active: None,
            },
        }
    }

    fn from_row(row: &MembershipRow) -> Option<Self> {
        let profile = row.profile.as_ref()?;
        Some(Self {
            id: row.user_id,
            name: profile.name.clone(),
            email: profile.email.clone(),
            avatar_url: profile.avatar_url.clone(),
            role: row.role,
            joined_at: row.joined_at,
            last_active: None,
        })
    }
}

/// Fold membership rows into one entry per member, current user first.
#[must_use]
pub fn build_roster(user: &SessionUser, profile: Option<&Profile>, rows: &[MembershipRow]) -> Vec<TeamMember> {
    let mut members = vec![TeamMember::current(user, profile)];
    let mut index: HashMap<Uuid, usize> = HashMap::from([(user.id, 0)]);

    for row in rows {
        if row.user_id == user.id {
            continue;
        }
        let Some(member) = TeamMember::from_row(row) else {
            debug!(user_id = %row.user_id, project_id = %row.project_id, "membership row without profile");
            continue;
        };
        match index.get(&member.id).copied() {
            None => {
                index.insert(member.id, members.len());
                members.push(member);
            }
            Some(slot) => {
                if member.role.is_privileged() && !members[slot].role.is_privileged() {
                    members[slot] = member;
                }
            }
        }
    }
    members
}

/// Case-insensitive match on name or email. A blank query keeps everyone.
#[must_use]
pub fn filter_members(members: &[TeamMember], query: &str) -> Vec<TeamMember> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return members.to_vec();
    }
    members
        .iter()
        .filter(|m| m.name.to_lowercase().contains(&query) || m.email.to_lowercase().contains(&query))
        .cloned()
        .collect()
}

/// Load the roster for the signed-in user.
///
/// # Errors
///
/// Returns an error when nobody is signed in or a backend query fails.
pub async fn fetch_team(state: &AppState) -> Result<Vec<TeamMember>, TeamError> {
    let snapshot = state.auth.snapshot();
    let user = snapshot.user.ok_or(TeamError::NotAuthenticated)?;

    let project_ids = state.backend.list_member_project_ids(user.id).await?;
    let rows = state.backend.list_project_members(&project_ids).await?;
    let members = build_roster(&user, snapshot.profile.as_ref(), &rows);
    debug!(user_id = %user.id, projects = project_ids.len(), members = members.len(), "team roster built");
    Ok(members)
}

#[cfg(test)]
#[path = "team_test.rs"]
mod tests;
