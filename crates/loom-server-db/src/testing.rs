// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fixtures shared by store tests in this crate and its dependents.

use loom_server_rbac::{OrgId, RequestContext, UserId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::sqlite::SqliteStore;
use crate::store::Store;
use crate::types::{
	InsertTemplateParams, InsertUserParams, InsertWorkspaceParams, Template, TemplateId, User,
	Workspace, WorkspaceId,
};

/// A single-connection in-memory pool. More connections would each see
/// their own empty database.
pub async fn create_test_pool() -> SqlitePool {
	let options = SqliteConnectOptions::from_str(":memory:")
		.unwrap()
		.create_if_missing(true);

	SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await
		.expect("Failed to create test pool")
}

pub async fn create_test_store() -> SqliteStore {
	let store = SqliteStore::new(create_test_pool().await);
	store.migrate().await.unwrap();
	store
}

fn random_name(prefix: &str) -> String {
	let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
		.take(8)
		.collect();
	format!("{prefix}-{}", suffix.to_lowercase())
}

pub fn insert_params_for_workspace(owner: UserId, org: OrgId) -> InsertWorkspaceParams {
	InsertWorkspaceParams {
		id: WorkspaceId::generate(),
		name: random_name("ws"),
		owner_id: owner,
		organization_id: org,
		template_id: TemplateId::generate(),
	}
}

pub fn insert_params_for_template(org: OrgId) -> InsertTemplateParams {
	InsertTemplateParams {
		id: TemplateId::generate(),
		organization_id: org,
		name: random_name("tpl"),
		description: String::new(),
		created_by: UserId::generate(),
		user_acl: BTreeMap::new(),
		group_acl: BTreeMap::new(),
	}
}

pub fn insert_params_for_user(roles: Vec<String>) -> InsertUserParams {
	let username = random_name("user");
	InsertUserParams {
		id: UserId::generate(),
		email: format!("{username}@example.com"),
		username,
		roles,
	}
}

pub async fn insert_random_workspace<S: Store + ?Sized>(
	store: &S,
	ctx: &RequestContext,
	owner: UserId,
	org: OrgId,
) -> Workspace {
	store
		.insert_workspace(ctx, insert_params_for_workspace(owner, org))
		.await
		.unwrap()
}

pub async fn insert_random_template<S: Store + ?Sized>(
	store: &S,
	ctx: &RequestContext,
	org: OrgId,
) -> Template {
	store
		.insert_template(ctx, insert_params_for_template(org))
		.await
		.unwrap()
}

pub async fn insert_random_user<S: Store + ?Sized>(
	store: &S,
	ctx: &RequestContext,
	roles: Vec<String>,
) -> User {
	store
		.insert_user(ctx, insert_params_for_user(roles))
		.await
		.unwrap()
}
