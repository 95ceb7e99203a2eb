use super::*;
use std::sync::Arc;

use crate::backend::TaskPriority;
use crate::state::test_helpers::*;

fn signed_in() -> (Arc<MockBackend>, AppState, Uuid) {
    let backend = Arc::new(MockBackend::new());
    let user = test_user("me@x.com", Some("Me"));
    let state = signed_in_state(backend.clone(), &user, None);
    (backend, state, user.id)
}

fn draft(project_id: Uuid, title: &str) -> TaskDraft {
    TaskDraft {
        project_id,
        title: title.to_owned(),
        description: Some("  ".to_owned()),
        priority: TaskPriority::High,
        assignee_id: None,
        due_date: None,
    }
}

#[tokio::test]
async fn every_operation_requires_a_user() {
    let backend = Arc::new(MockBackend::new());
    let state = test_app_state(backend.clone());
    let id = Uuid::new_v4();

    assert!(matches!(list_projects(&state).await, Err(ProjectError::NotAuthenticated)));
    assert!(matches!(create_project(&state, "P", None).await, Err(ProjectError::NotAuthenticated)));
    assert!(matches!(list_tasks(&state, id).await, Err(ProjectError::NotAuthenticated)));
    assert!(matches!(create_task(&state, draft(id, "T")).await, Err(ProjectError::NotAuthenticated)));
    assert!(matches!(delete_task(&state, id).await, Err(ProjectError::NotAuthenticated)));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn create_project_adds_owner_membership() {
    let (backend, state, user_id) = signed_in();

    let project = create_project(&state, "  Launch ", Some("")).await.unwrap();

    assert_eq!(project.name, "Launch");
    assert_eq!(project.owner_id, user_id);
    assert!(project.description.is_none());
    let rows = backend.memberships.lock().unwrap().clone();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].project_id, project.id);
    assert_eq!(rows[0].role, MemberRole::Owner);
}

#[tokio::test]
async fn create_project_rejects_blank_name() {
    let (backend, state, _) = signed_in();
    assert!(matches!(create_project(&state, "   ", None).await, Err(ProjectError::NameRequired)));
    assert_eq!(backend.count("insert_project"), 0);
}

#[tokio::test]
async fn list_projects_returns_member_projects_only() {
    let (backend, state, _) = signed_in();
    let mine = create_project(&state, "Mine", None).await.unwrap();
    backend.projects.lock().unwrap().push(Project {
        id: Uuid::new_v4(),
        name: "Theirs".into(),
        description: None,
        owner_id: Uuid::new_v4(),
        created_at: time::OffsetDateTime::UNIX_EPOCH,
    });

    let projects = list_projects(&state).await.unwrap();

    assert_eq!(projects, vec![mine]);
}

#[tokio::test]
async fn create_task_starts_in_todo() {
    let (_backend, state, user_id) = signed_in();
    let project = create_project(&state, "P", None).await.unwrap();

    let task = create_task(&state, draft(project.id, " Write docs ")).await.unwrap();

    assert_eq!(task.title, "Write docs");
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(task.created_by, user_id);
    assert!(task.description.is_none());
    assert_eq!(list_tasks(&state, project.id).await.unwrap(), vec![task]);
}

#[tokio::test]
async fn create_task_rejects_blank_title() {
    let (_backend, state, _) = signed_in();
    let err = create_task(&state, draft(Uuid::new_v4(), "")).await.unwrap_err();
    assert!(matches!(err, ProjectError::TitleRequired));
}

#[tokio::test]
async fn update_task_changes_status() {
    let (_backend, state, _) = signed_in();
    let task = create_task(&state, draft(Uuid::new_v4(), "T")).await.unwrap();

    let patch = TaskPatch { status: Some(TaskStatus::Done), ..TaskPatch::default() };
    let updated = update_task(&state, task.id, patch).await.unwrap();

    assert_eq!(updated.status, TaskStatus::Done);
    assert_eq!(updated.title, "T");
}

#[tokio::test]
async fn update_task_rejects_empty_patch() {
    let (backend, state, _) = signed_in();
    let err = update_task(&state, Uuid::new_v4(), TaskPatch::default()).await.unwrap_err();
    assert!(matches!(err, ProjectError::EmptyPatch));
    assert_eq!(backend.count("update_task"), 0);
}

#[tokio::test]
async fn update_missing_task_is_backend_error() {
    let (_backend, state, _) = signed_in();
    let patch = TaskPatch { title: Some("x".into()), ..TaskPatch::default() };
    let err = update_task(&state, Uuid::new_v4(), patch).await.unwrap_err();
    assert!(matches!(err, ProjectError::Backend(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn delete_task_removes_it() {
    let (_backend, state, _) = signed_in();
    let task = create_task(&state, draft(Uuid::new_v4(), "T")).await.unwrap();

    delete_task(&state, task.id).await.unwrap();

    assert!(list_tasks(&state, task.project_id).await.unwrap().is_empty());
}
