//! Project and task operations for the signed-in user.
//!
//! These are plain request/response calls: they read the current user from
//! the auth store but never write to it.

use tracing::info;
use uuid::Uuid;

use crate::backend::{
    BackendError, MemberRole, NewMembership, NewProject, NewTask, Project, Task, TaskDraft, TaskPatch, TaskStatus,
};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("Project name is required")]
    NameRequired,
    #[error("Task title is required")]
    TitleRequired,
    #[error("nothing to update")]
    EmptyPatch,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn require_user(state: &AppState) -> Result<Uuid, ProjectError> {
    state.auth.snapshot().user_id().ok_or(ProjectError::NotAuthenticated)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_owned)
}

/// Projects the current user is a member of.
///
/// # Errors
///
/// Returns an error when nobody is signed in or a query fails.
pub async fn list_projects(state: &AppState) -> Result<Vec<Project>, ProjectError> {
    let user_id = require_user(state)?;
    let ids = state.backend.list_member_project_ids(user_id).await?;
    Ok(state.backend.list_projects(&ids).await?)
}

/// Create a project owned by the current user and record the owner membership.
///
/// # Errors
///
/// Returns an error for a blank name, a missing user or a rejected insert.
pub async fn create_project(state: &AppState, name: &str, description: Option<&str>) -> Result<Project, ProjectError> {
    let user_id = require_user(state)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ProjectError::NameRequired);
    }

    let project = state
        .backend
        .insert_project(&NewProject { name: name.to_owned(), description: non_blank(description), owner_id: user_id })
        .await?;
    state
        .backend
        .insert_membership(&NewMembership { project_id: project.id, user_id, role: MemberRole::Owner })
        .await?;

    info!(project_id = %project.id, user_id = %user_id, "project created");
    Ok(project)
}

/// # Errors
///
/// Returns an error when nobody is signed in or the query fails.
pub async fn list_tasks(state: &AppState, project_id: Uuid) -> Result<Vec<Task>, ProjectError> {
    require_user(state)?;
    Ok(state.backend.list_tasks(project_id).await?)
}

/// Create a task in `todo`, attributed to the current user.
///
/// # Errors
///
/// Returns an error for a blank title, a missing user or a rejected insert.
pub async fn create_task(state: &AppState, draft: TaskDraft) -> Result<Task, ProjectError> {
    let user_id = require_user(state)?;
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(ProjectError::TitleRequired);
    }

    let task = NewTask {
        project_id: draft.project_id,
        title: title.to_owned(),
        description: non_blank(draft.description.as_deref()),
        status: TaskStatus::Todo,
        priority: draft.priority,
        assignee_id: draft.assignee_id,
        due_date: draft.due_date,
        created_by: user_id,
    };
    let task = state.backend.insert_task(&task).await?;
    info!(task_id = %task.id, project_id = %task.project_id, "task created");
    Ok(task)
}

/// Apply a partial update.
///
/// # Errors
///
/// Returns an error for an empty patch, a blank title, a missing user or a rejected update.
pub async fn update_task(state: &AppState, id: Uuid, mut patch: TaskPatch) -> Result<Task, ProjectError> {
    require_user(state)?;
    if patch.is_empty() {
        return Err(ProjectError::EmptyPatch);
    }
    if let Some(title) = patch.title.as_mut() {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(ProjectError::TitleRequired);
        }
        *title = trimmed.to_owned();
    }
    let task = state.backend.update_task(id, &patch).await?;
    info!(task_id = %task.id, status = %task.status, "task updated");
    Ok(task)
}

/// # Errors
///
/// Returns an error when nobody is signed in or the delete is rejected.
pub async fn delete_task(state: &AppState, id: Uuid) -> Result<(), ProjectError> {
    require_user(state)?;
    state.backend.delete_task(id).await?;
    info!(task_id = %id, "task deleted");
    Ok(())
}

#[cfg(test)]
#[path = "projects_test.rs"]
mod tests;
