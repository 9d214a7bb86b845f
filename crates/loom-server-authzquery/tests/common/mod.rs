// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use async_trait::async_trait;
use loom_server_db::{
	InsertTemplateParams, InsertUserParams, InsertWorkspaceParams, MemoryStore, Result, Store,
	Template, TemplateFilter, TemplateId, UpdateTemplateDeletedParams, UpdateTemplateMetaParams,
	UpdateUserProfileParams, UpdateUserRolesParams, UpdateWorkspaceDeletedParams,
	UpdateWorkspaceParams, User, UserFilter, Workspace, WorkspaceFilter, WorkspaceId,
};
use loom_server_rbac::{Predicate, RequestContext, Subject, UserId};
use std::sync::Mutex;

pub fn subject(roles: &[&str]) -> Subject {
	Subject::with_role_names(UserId::generate(), roles.iter().copied())
}

pub fn ctx_for(subject: &Subject) -> RequestContext {
	RequestContext::with_subject(subject.clone())
}

/// A store double that records which operations reached it. With
/// `stalling`, mutations never complete. With `granting_on_read`, every user
/// read returns the stored row and then grants the user an extra role, as a
/// concurrent writer would.
#[derive(Default)]
pub struct CountingStore {
	inner: MemoryStore,
	calls: Mutex<Vec<&'static str>>,
	stall_mutations: bool,
	grant_on_read: Option<String>,
}

impl CountingStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn stalling() -> Self {
		Self {
			stall_mutations: true,
			..Self::default()
		}
	}

	pub fn granting_on_read(role: &str) -> Self {
		Self {
			grant_on_read: Some(role.to_string()),
			..Self::default()
		}
	}

	pub fn seed(&self) -> &MemoryStore {
		&self.inner
	}

	pub fn calls(&self) -> Vec<&'static str> {
		self.calls.lock().unwrap().clone()
	}

	pub fn mutations(&self) -> Vec<&'static str> {
		self.calls()
			.into_iter()
			.filter(|c| c.starts_with("insert_") || c.starts_with("update_"))
			.collect()
	}

	fn record(&self, op: &'static str) {
		self.calls.lock().unwrap().push(op);
	}

	async fn mutation(&self, op: &'static str) {
		self.record(op);
		if self.stall_mutations {
			std::future::pending::<()>().await;
		}
	}
}

#[async_trait]
impl Store for CountingStore {
	async fn get_workspace_by_id(&self, ctx: &RequestContext, id: WorkspaceId) -> Result<Workspace> {
		self.record("get_workspace_by_id");
		self.inner.get_workspace_by_id(ctx, id).await
	}

	async fn get_workspaces(
		&self,
		ctx: &RequestContext,
		filter: &WorkspaceFilter,
	) -> Result<Vec<Workspace>> {
		self.record("get_workspaces");
		self.inner.get_workspaces(ctx, filter).await
	}

	async fn get_authorized_workspaces(
		&self,
		ctx: &RequestContext,
		filter: &WorkspaceFilter,
		predicate: &Predicate,
	) -> Result<Vec<Workspace>> {
		self.record("get_authorized_workspaces");
		self.inner
			.get_authorized_workspaces(ctx, filter, predicate)
			.await
	}

	async fn insert_workspace(
		&self,
		ctx: &RequestContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace> {
		self.mutation("insert_workspace").await;
		self.inner.insert_workspace(ctx, params).await
	}

	async fn update_workspace(
		&self,
		ctx: &RequestContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace> {
		self.mutation("update_workspace").await;
		self.inner.update_workspace(ctx, params).await
	}

	async fn update_workspace_deleted(
		&self,
		ctx: &RequestContext,
		params: UpdateWorkspaceDeletedParams,
	) -> Result<()> {
		self.mutation("update_workspace_deleted").await;
		self.inner.update_workspace_deleted(ctx, params).await
	}

	async fn get_template_by_id(&self, ctx: &RequestContext, id: TemplateId) -> Result<Template> {
		self.record("get_template_by_id");
		self.inner.get_template_by_id(ctx, id).await
	}

	async fn get_templates(
		&self,
		ctx: &RequestContext,
		filter: &TemplateFilter,
	) -> Result<Vec<Template>> {
		self.record("get_templates");
		self.inner.get_templates(ctx, filter).await
	}

	async fn get_authorized_templates(
		&self,
		ctx: &RequestContext,
		filter: &TemplateFilter,
		predicate: &Predicate,
	) -> Result<Vec<Template>> {
		self.record("get_authorized_templates");
		self.inner
			.get_authorized_templates(ctx, filter, predicate)
			.await
	}

	async fn insert_template(
		&self,
		ctx: &RequestContext,
		params: InsertTemplateParams,
	) -> Result<Template> {
		self.mutation("insert_template").await;
		self.inner.insert_template(ctx, params).await
	}

	async fn update_template_meta(
		&self,
		ctx: &RequestContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template> {
		self.mutation("update_template_meta").await;
		self.inner.update_template_meta(ctx, params).await
	}

	async fn update_template_deleted(
		&self,
		ctx: &RequestContext,
		params: UpdateTemplateDeletedParams,
	) -> Result<()> {
		self.mutation("update_template_deleted").await;
		self.inner.update_template_deleted(ctx, params).await
	}

	async fn get_user_by_id(&self, ctx: &RequestContext, id: UserId) -> Result<User> {
		self.record("get_user_by_id");
		let user = self.inner.get_user_by_id(ctx, id).await?;
		if let Some(role) = &self.grant_on_read {
			let mut roles = user.roles.clone();
			roles.push(role.clone());
			self.inner
				.update_user_roles(
					ctx,
					UpdateUserRolesParams {
						id,
						roles,
						expected_roles: None,
					},
				)
				.await?;
		}
		Ok(user)
	}

	async fn get_users(&self, ctx: &RequestContext, filter: &UserFilter) -> Result<Vec<User>> {
		self.record("get_users");
		self.inner.get_users(ctx, filter).await
	}

	async fn insert_user(&self, ctx: &RequestContext, params: InsertUserParams) -> Result<User> {
		self.mutation("insert_user").await;
		self.inner.insert_user(ctx, params).await
	}

	async fn update_user_profile(
		&self,
		ctx: &RequestContext,
		params: UpdateUserProfileParams,
	) -> Result<User> {
		self.mutation("update_user_profile").await;
		self.inner.update_user_profile(ctx, params).await
	}

	async fn update_user_roles(
		&self,
		ctx: &RequestContext,
		params: UpdateUserRolesParams,
	) -> Result<User> {
		self.mutation("update_user_roles").await;
		self.inner.update_user_roles(ctx, params).await
	}
}
