// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enforcement behaviour of the wrapper with the real authorizer: denials
//! stop mutations, missing subjects and cancellation are errors, and
//! store-side filtering can only narrow.

mod common;

use common::{ctx_for, subject, CountingStore};
use loom_server_authzquery::AuthzQuerier;
use loom_server_db::testing::{
	create_test_store, insert_params_for_user, insert_params_for_workspace, insert_random_template,
	insert_random_user, insert_random_workspace,
};
use loom_server_db::{
	DbError, MemoryStore, Store, UpdateTemplateDeletedParams, UpdateUserProfileParams,
	UpdateUserRolesParams, UpdateWorkspaceDeletedParams, UpdateWorkspaceParams, WorkspaceFilter,
};
use loom_server_rbac::{
	Action, Authorizer, Object, OrgId, Predicate, RbacAuthorizer, RbacError, RequestContext,
	ResourceType, Subject, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn rbac() -> Arc<RbacAuthorizer> {
	Arc::new(RbacAuthorizer::new().unwrap())
}

fn counting_store() -> AuthzQuerier<CountingStore> {
	AuthzQuerier::new(CountingStore::new(), rbac())
}

// =============================================================================
// Fail closed
// =============================================================================

#[tokio::test]
async fn denied_update_never_reaches_the_store() {
	let store = counting_store();
	let seed = RequestContext::anonymous();
	let theirs =
		insert_random_workspace(store.inner().seed(), &seed, UserId::generate(), OrgId::generate())
			.await;

	let member = subject(&["member"]);
	let err = store
		.update_workspace(
			&ctx_for(&member),
			UpdateWorkspaceParams {
				id: theirs.id,
				name: "mine now".to_string(),
			},
		)
		.await
		.unwrap_err();

	assert!(err.is_forbidden());
	assert_eq!(store.inner().calls(), vec!["get_workspace_by_id"]);
	assert!(store.inner().mutations().is_empty());
}

#[tokio::test]
async fn denied_insert_never_reaches_the_store() {
	let store = counting_store();
	let member = subject(&["member"]);

	let err = store
		.insert_workspace(
			&ctx_for(&member),
			insert_params_for_workspace(UserId::generate(), OrgId::generate()),
		)
		.await
		.unwrap_err();

	assert!(err.is_forbidden());
	assert!(store.inner().calls().is_empty());
}

#[tokio::test]
async fn denied_delete_never_reaches_the_store() {
	let store = counting_store();
	let seed = RequestContext::anonymous();
	let org = OrgId::generate();
	let workspace =
		insert_random_workspace(store.inner().seed(), &seed, UserId::generate(), org).await;
	let template = insert_random_template(store.inner().seed(), &seed, org).await;
	let ctx = ctx_for(&subject(&["member"]));

	let err = store
		.update_workspace_deleted(
			&ctx,
			UpdateWorkspaceDeletedParams {
				id: workspace.id,
				deleted: true,
			},
		)
		.await
		.unwrap_err();
	assert!(err.is_forbidden());

	let err = store
		.update_template_deleted(
			&ctx,
			UpdateTemplateDeletedParams {
				id: template.id,
				deleted: true,
			},
		)
		.await
		.unwrap_err();
	assert!(err.is_forbidden());

	assert!(store.inner().mutations().is_empty());
	let kept = store
		.inner()
		.seed()
		.get_workspace_by_id(&seed, workspace.id)
		.await
		.unwrap();
	assert!(!kept.deleted);
}

#[tokio::test]
async fn member_manages_own_workspace() {
	let store = counting_store();
	let member = subject(&["member"]);
	let ctx = ctx_for(&member);

	let workspace = store
		.insert_workspace(&ctx, insert_params_for_workspace(member.id(), OrgId::generate()))
		.await
		.unwrap();
	store
		.update_workspace_deleted(
			&ctx,
			UpdateWorkspaceDeletedParams {
				id: workspace.id,
				deleted: true,
			},
		)
		.await
		.unwrap();

	assert_eq!(
		store.inner().mutations(),
		vec!["insert_workspace", "update_workspace_deleted"]
	);
}

#[tokio::test]
async fn listing_drops_unreadable_rows() {
	let store = counting_store();
	let seed = RequestContext::anonymous();
	let member = subject(&["member"]);
	let org = OrgId::generate();
	let mine = insert_random_workspace(store.inner().seed(), &seed, member.id(), org).await;
	insert_random_workspace(store.inner().seed(), &seed, UserId::generate(), org).await;

	let listed = store
		.get_workspaces(&ctx_for(&member), &WorkspaceFilter::default())
		.await
		.unwrap();
	assert_eq!(listed, vec![mine]);
}

#[tokio::test]
async fn denied_read_is_forbidden_not_not_found() {
	let store = counting_store();
	let seed = RequestContext::anonymous();
	let theirs =
		insert_random_workspace(store.inner().seed(), &seed, UserId::generate(), OrgId::generate())
			.await;

	let err = store
		.get_workspace_by_id(&ctx_for(&subject(&["member"])), theirs.id)
		.await
		.unwrap_err();
	assert!(err.is_forbidden());
	assert!(!err.is_not_found());
}

// =============================================================================
// Missing subject
// =============================================================================

#[tokio::test]
async fn operations_without_a_subject_fail() {
	let store = counting_store();
	let anonymous = RequestContext::anonymous();

	let err = store
		.get_workspaces(&anonymous, &WorkspaceFilter::default())
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		DbError::Authorization(RbacError::NoAuthorizationContext)
	));

	let err = store
		.insert_user(&anonymous, insert_params_for_user(vec![]))
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		DbError::Authorization(RbacError::NoAuthorizationContext)
	));

	assert!(store.inner().calls().is_empty());
}

// =============================================================================
// Cancellation
// =============================================================================

/// Allows everything and cancels the request while doing so.
struct CancellingAuthorizer {
	token: CancellationToken,
}

impl Authorizer for CancellingAuthorizer {
	fn authorize(&self, _: &Subject, _: Action, _: &Object) -> Result<(), RbacError> {
		self.token.cancel();
		Ok(())
	}

	fn partial(&self, _: &Subject, _: Action, _: &ResourceType) -> Result<Predicate, RbacError> {
		self.token.cancel();
		Ok(Predicate::TRUE)
	}
}

#[tokio::test]
async fn cancelled_context_starts_nothing() {
	let store = counting_store();
	let ctx = ctx_for(&subject(&["owner"]));
	ctx.cancel();

	let err = store
		.get_workspaces(&ctx, &WorkspaceFilter::default())
		.await
		.unwrap_err();
	assert!(matches!(err, DbError::Canceled));
	assert!(store.inner().calls().is_empty());
}

#[tokio::test]
async fn cancellation_after_authorization_skips_the_mutation() {
	let token = CancellationToken::new();
	let store = AuthzQuerier::new(
		CountingStore::new(),
		Arc::new(CancellingAuthorizer {
			token: token.clone(),
		}),
	);
	let owner = subject(&["owner"]);
	let ctx = ctx_for(&owner).with_cancellation(token);

	let err = store
		.insert_workspace(
			&ctx,
			insert_params_for_workspace(owner.id(), OrgId::generate()),
		)
		.await
		.unwrap_err();

	assert!(matches!(err, DbError::Canceled));
	assert!(store.inner().calls().is_empty());
}

#[tokio::test]
async fn in_flight_mutation_is_aborted() {
	let store = AuthzQuerier::new(CountingStore::stalling(), rbac());
	let seed = RequestContext::anonymous();
	let workspace =
		insert_random_workspace(store.inner().seed(), &seed, UserId::generate(), OrgId::generate())
			.await;
	let ctx = ctx_for(&subject(&["owner"]));

	let canceller = async {
		tokio::time::sleep(Duration::from_millis(20)).await;
		ctx.cancel();
	};
	let (result, ()) = tokio::join!(
		store.update_workspace(
			&ctx,
			UpdateWorkspaceParams {
				id: workspace.id,
				name: "renamed".to_string(),
			},
		),
		canceller
	);

	assert!(matches!(result, Err(DbError::Canceled)));
	assert_eq!(
		store.inner().calls(),
		vec!["get_workspace_by_id", "update_workspace"]
	);
	let unchanged = store
		.inner()
		.seed()
		.get_workspace_by_id(&seed, workspace.id)
		.await
		.unwrap();
	assert_eq!(unchanged.name, workspace.name);
}

// =============================================================================
// Store-side filtering
// =============================================================================

#[tokio::test]
async fn caller_predicate_only_narrows() {
	let store = AuthzQuerier::new(MemoryStore::new(), rbac());
	let seed = RequestContext::anonymous();
	let member = subject(&["member"]);
	let org_a = OrgId::generate();
	let org_b = OrgId::generate();
	let mine_a = insert_random_workspace(store.inner(), &seed, member.id(), org_a).await;
	let mine_b = insert_random_workspace(store.inner(), &seed, member.id(), org_b).await;
	insert_random_workspace(store.inner(), &seed, UserId::generate(), org_a).await;
	let ctx = ctx_for(&member);

	let mut everything = store
		.get_authorized_workspaces(&ctx, &WorkspaceFilter::default(), &Predicate::TRUE)
		.await
		.unwrap();
	everything.sort_by_key(|w| w.id);
	let mut expected = vec![mine_a.clone(), mine_b];
	expected.sort_by_key(|w| w.id);
	assert_eq!(everything, expected);

	let narrowed = store
		.get_authorized_workspaces(
			&ctx,
			&WorkspaceFilter::default(),
			&Predicate::org_owner_in([org_a]),
		)
		.await
		.unwrap();
	assert_eq!(narrowed, vec![mine_a]);
}

#[tokio::test]
async fn sqlite_store_applies_the_combined_predicate() {
	let store = AuthzQuerier::new(create_test_store().await, rbac());
	let seed = RequestContext::anonymous();
	let org = OrgId::generate();
	let admin = subject(&[format!("organization-admin:{org}").as_str()]);

	let in_org = insert_random_workspace(store.inner(), &seed, UserId::generate(), org).await;
	insert_random_workspace(store.inner(), &seed, UserId::generate(), OrgId::generate()).await;

	let listed = store
		.get_authorized_workspaces(&ctx_for(&admin), &WorkspaceFilter::default(), &Predicate::TRUE)
		.await
		.unwrap();
	assert_eq!(listed, vec![in_org]);
}

// =============================================================================
// Users and role assignment
// =============================================================================

#[tokio::test]
async fn member_edits_only_own_profile() {
	let store = AuthzQuerier::new(MemoryStore::new(), rbac());
	let seed = RequestContext::anonymous();
	let me = insert_random_user(store.inner(), &seed, vec!["member".to_string()]).await;
	let other = insert_random_user(store.inner(), &seed, vec!["member".to_string()]).await;
	let ctx = ctx_for(&Subject::with_role_names(me.id, me.roles.clone()));

	store
		.update_user_profile(
			&ctx,
			UpdateUserProfileParams {
				id: me.id,
				username: me.username.clone(),
				email: "new@example.com".to_string(),
			},
		)
		.await
		.unwrap();

	let err = store
		.update_user_profile(
			&ctx,
			UpdateUserProfileParams {
				id: other.id,
				username: other.username.clone(),
				email: "stolen@example.com".to_string(),
			},
		)
		.await
		.unwrap_err();
	assert!(err.is_forbidden());
}

#[tokio::test]
async fn member_cannot_grant_itself_roles() {
	let store = AuthzQuerier::new(MemoryStore::new(), rbac());
	let seed = RequestContext::anonymous();
	let me = insert_random_user(store.inner(), &seed, vec!["member".to_string()]).await;
	let ctx = ctx_for(&Subject::with_role_names(me.id, me.roles.clone()));

	let err = store
		.update_user_roles(
			&ctx,
			UpdateUserRolesParams {
				id: me.id,
				roles: vec!["member".to_string(), "owner".to_string()],
				expected_roles: None,
			},
		)
		.await
		.unwrap_err();
	assert!(err.is_forbidden());

	let unchanged = store.inner().get_user_by_id(&seed, me.id).await.unwrap();
	assert_eq!(unchanged.roles, vec!["member".to_string()]);
}

#[tokio::test]
async fn user_admin_assigns_within_its_limits() {
	let store = AuthzQuerier::new(MemoryStore::new(), rbac());
	let seed = RequestContext::anonymous();
	let target = insert_random_user(store.inner(), &seed, vec!["member".to_string()]).await;
	let ctx = ctx_for(&subject(&["user-admin"]));

	let updated = store
		.update_user_roles(
			&ctx,
			UpdateUserRolesParams {
				id: target.id,
				roles: vec!["member".to_string(), "auditor".to_string()],
				expected_roles: None,
			},
		)
		.await
		.unwrap();
	assert_eq!(updated.roles, vec!["member".to_string(), "auditor".to_string()]);

	let err = store
		.update_user_roles(
			&ctx,
			UpdateUserRolesParams {
				id: target.id,
				roles: vec!["owner".to_string()],
				expected_roles: None,
			},
		)
		.await
		.unwrap_err();
	assert!(err.is_forbidden());

	let err = store
		.insert_user(&ctx, insert_params_for_user(vec!["owner".to_string()]))
		.await
		.unwrap_err();
	assert!(err.is_forbidden());
}

#[tokio::test]
async fn role_update_does_not_overwrite_a_concurrent_grant() {
	let store = AuthzQuerier::new(CountingStore::granting_on_read("owner"), rbac());
	let seed = RequestContext::anonymous();
	let target = insert_random_user(store.inner().seed(), &seed, vec!["member".to_string()]).await;
	let ctx = ctx_for(&subject(&["user-admin"]));

	let err = store
		.update_user_roles(
			&ctx,
			UpdateUserRolesParams {
				id: target.id,
				roles: vec!["member".to_string(), "auditor".to_string()],
				expected_roles: None,
			},
		)
		.await
		.unwrap_err();
	assert!(matches!(err, DbError::Conflict(_)));

	let stored = store
		.inner()
		.seed()
		.get_user_by_id(&seed, target.id)
		.await
		.unwrap();
	assert!(stored.roles.contains(&"owner".to_string()));
	assert!(!stored.roles.contains(&"auditor".to_string()));
}

#[tokio::test]
async fn stale_caller_expectation_is_a_conflict() {
	let store = AuthzQuerier::new(MemoryStore::new(), rbac());
	let seed = RequestContext::anonymous();
	let target = insert_random_user(store.inner(), &seed, vec!["member".to_string()]).await;
	let ctx = ctx_for(&subject(&["user-admin"]));

	let err = store
		.update_user_roles(
			&ctx,
			UpdateUserRolesParams {
				id: target.id,
				roles: vec!["member".to_string(), "auditor".to_string()],
				expected_roles: Some(vec![]),
			},
		)
		.await
		.unwrap_err();
	assert!(matches!(err, DbError::Conflict(_)));
}
