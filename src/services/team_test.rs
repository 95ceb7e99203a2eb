use super::*;
use std::sync::Arc;

use crate::state::test_helpers::*;

fn roster_user() -> (SessionUser, Profile) {
    let user = test_user("me@x.com", Some("Me"));
    let profile = profile_for(&user, "Me");
    (user, profile)
}

// =============================================================================
// build_roster
// =============================================================================

#[test]
fn current_user_is_first_and_owner() {
    let (user, profile) = roster_user();
    let project = Uuid::new_v4();
    let rows = vec![membership(user.id, project, MemberRole::Member, "Me", "me@x.com")];

    let members = build_roster(&user, Some(&profile), &rows);

    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, user.id);
    assert_eq!(members[0].role, MemberRole::Owner);
    assert_eq!(members[0].name, "Me");
}

#[test]
fn current_user_stays_owner_over_admin_rows() {
    let (user, profile) = roster_user();
    let rows = vec![
        membership(user.id, Uuid::new_v4(), MemberRole::Admin, "Me", "me@x.com"),
        membership(user.id, Uuid::new_v4(), MemberRole::Member, "Me", "me@x.com"),
    ];
    let members = build_roster(&user, Some(&profile), &rows);
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, MemberRole::Owner);
}

#[test]
fn current_user_without_profile_uses_identity() {
    let user = test_user("me@x.com", None);
    let members = build_roster(&user, None, &[]);
    assert_eq!(members[0].name, "me");
    assert_eq!(members[0].email, "me@x.com");
    assert!(members[0].joined_at.is_none());
}

#[test]
fn duplicate_member_rows_collapse() {
    let (user, profile) = roster_user();
    let bob = Uuid::new_v4();
    let rows = vec![
        membership(bob, Uuid::new_v4(), MemberRole::Member, "Bob", "bob@x.com"),
        membership(bob, Uuid::new_v4(), MemberRole::Member, "Bob", "bob@x.com"),
    ];
    let members = build_roster(&user, Some(&profile), &rows);
    assert_eq!(members.len(), 2);
    assert_eq!(members[1].id, bob);
}

#[test]
fn privileged_row_replaces_member_entry() {
    let (user, profile) = roster_user();
    let bob = Uuid::new_v4();
    let rows = vec![
        membership(bob, Uuid::new_v4(), MemberRole::Member, "Bob", "bob@x.com"),
        membership(bob, Uuid::new_v4(), MemberRole::Admin, "Bob", "bob@x.com"),
    ];
    let members = build_roster(&user, Some(&profile), &rows);
    assert_eq!(members[1].role, MemberRole::Admin);
}

#[test]
fn first_privileged_entry_wins() {
    let (user, profile) = roster_user();
    let bob = Uuid::new_v4();
    let rows = vec![
        membership(bob, Uuid::new_v4(), MemberRole::Admin, "Bob", "bob@x.com"),
        membership(bob, Uuid::new_v4(), MemberRole::Owner, "Bob", "bob@x.com"),
        membership(bob, Uuid::new_v4(), MemberRole::Member, "Bob", "bob@x.com"),
    ];
    let members = build_roster(&user, Some(&profile), &rows);
    assert_eq!(members[1].role, MemberRole::Admin);
}

#[test]
fn rows_without_profile_are_skipped() {
    let (user, profile) = roster_user();
    let mut row = membership(Uuid::new_v4(), Uuid::new_v4(), MemberRole::Member, "Ghost", "ghost@x.com");
    row.profile = None;
    let members = build_roster(&user, Some(&profile), &[row]);
    assert_eq!(members.len(), 1);
}

#[test]
fn last_active_is_never_set() {
    let (user, profile) = roster_user();
    let rows = vec![membership(Uuid::new_v4(), Uuid::new_v4(), MemberRole::Member, "Bob", "bob@x.com")];
    let members = build_roster(&user, Some(&profile), &rows);
    assert!(members.iter().all(|m| m.last_active.is_none()));
}

// =============================================================================
// filter_members
// =============================================================================

fn sample_members() -> Vec<TeamMember> {
    let (user, profile) = roster_user();
    let rows = vec![
        membership(Uuid::new_v4(), Uuid::new_v4(), MemberRole::Member, "Bob Stone", "bob@x.com"),
        membership(Uuid::new_v4(), Uuid::new_v4(), MemberRole::Member, "Alice", "ALICE@corp.io"),
    ];
    build_roster(&user, Some(&profile), &rows)
}

#[test]
fn filter_matches_name_case_insensitively() {
    let found = filter_members(&sample_members(), "STONE");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Bob Stone");
}

#[test]
fn filter_matches_email() {
    let found = filter_members(&sample_members(), "corp.io");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Alice");
}

#[test]
fn blank_query_keeps_everyone() {
    assert_eq!(filter_members(&sample_members(), "   ").len(), 3);
}

// =============================================================================
// fetch_team
// =============================================================================

#[tokio::test]
async fn fetch_team_requires_user() {
    let state = test_app_state(Arc::new(MockBackend::new()));
    assert!(matches!(fetch_team(&state).await, Err(TeamError::NotAuthenticated)));
}

#[tokio::test]
async fn fetch_team_collects_members_across_projects() {
    let backend = Arc::new(MockBackend::new());
    let (user, profile) = roster_user();
    let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
    let bob = Uuid::new_v4();
    {
        let mut rows = backend.memberships.lock().unwrap();
        rows.push(membership(user.id, p1, MemberRole::Owner, "Me", "me@x.com"));
        rows.push(membership(user.id, p2, MemberRole::Member, "Me", "me@x.com"));
        rows.push(membership(bob, p1, MemberRole::Member, "Bob", "bob@x.com"));
        rows.push(membership(bob, p2, MemberRole::Admin, "Bob", "bob@x.com"));
        rows.push(membership(Uuid::new_v4(), Uuid::new_v4(), MemberRole::Member, "Stranger", "s@x.com"));
    }
    let state = signed_in_state(backend.clone(), &user, Some(profile));

    let members = fetch_team(&state).await.unwrap();

    assert_eq!(members.len(), 2);
    assert_eq!(members[0].role, MemberRole::Owner);
    assert_eq!(members[1].id, bob);
    assert_eq!(members[1].role, MemberRole::Admin);
}

#[tokio::test]
async fn fetch_team_surfaces_backend_error() {
    let backend = Arc::new(MockBackend::new());
    *backend.membership_error.lock().unwrap() = Some(api_error("permission denied"));
    let (user, _) = roster_user();
    let state = signed_in_state(backend, &user, None);

    let err = fetch_team(&state).await.unwrap_err();
    assert_eq!(err.to_string(), "permission denied");
}
