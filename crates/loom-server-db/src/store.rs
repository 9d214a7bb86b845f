// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The store operation surface.
//!
//! Every operation takes the [`RequestContext`] it runs under as its first
//! argument. Plain stores ignore the subject; the authorizing wrapper in
//! `loom-server-authzquery` requires it.

use async_trait::async_trait;
use loom_server_rbac::{OrgId, Predicate, RequestContext, UserId};

use crate::error::Result;
use crate::types::{
	InsertTemplateParams, InsertUserParams, InsertWorkspaceParams, Template, TemplateFilter,
	TemplateId, UpdateTemplateDeletedParams, UpdateTemplateMetaParams, UpdateUserProfileParams,
	UpdateUserRolesParams, UpdateWorkspaceDeletedParams, UpdateWorkspaceParams, User, UserFilter,
	Workspace, WorkspaceFilter, WorkspaceId,
};

#[async_trait]
pub trait Store: Send + Sync {
	// Workspaces
	async fn get_workspace_by_id(&self, ctx: &RequestContext, id: WorkspaceId) -> Result<Workspace>;
	async fn get_workspaces(
		&self,
		ctx: &RequestContext,
		filter: &WorkspaceFilter,
	) -> Result<Vec<Workspace>>;
	/// Workspaces matching `filter` and `predicate`, filtered by the store.
	async fn get_authorized_workspaces(
		&self,
		ctx: &RequestContext,
		filter: &WorkspaceFilter,
		predicate: &Predicate,
	) -> Result<Vec<Workspace>>;
	async fn insert_workspace(
		&self,
		ctx: &RequestContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace>;
	async fn update_workspace(
		&self,
		ctx: &RequestContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace>;
	async fn update_workspace_deleted(
		&self,
		ctx: &RequestContext,
		params: UpdateWorkspaceDeletedParams,
	) -> Result<()>;

	// Templates
	async fn get_template_by_id(&self, ctx: &RequestContext, id: TemplateId) -> Result<Template>;
	async fn get_templates(
		&self,
		ctx: &RequestContext,
		filter: &TemplateFilter,
	) -> Result<Vec<Template>>;
	async fn get_templates_by_organization(
		&self,
		ctx: &RequestContext,
		organization_id: OrgId,
	) -> Result<Vec<Template>> {
		let filter = TemplateFilter {
			organization_id: Some(organization_id),
			include_deleted: false,
		};
		self.get_templates(ctx, &filter).await
	}
	/// Templates matching `filter` and `predicate`, filtered by the store.
	async fn get_authorized_templates(
		&self,
		ctx: &RequestContext,
		filter: &TemplateFilter,
		predicate: &Predicate,
	) -> Result<Vec<Template>>;
	async fn insert_template(
		&self,
		ctx: &RequestContext,
		params: InsertTemplateParams,
	) -> Result<Template>;
	async fn update_template_meta(
		&self,
		ctx: &RequestContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template>;
	async fn update_template_deleted(
		&self,
		ctx: &RequestContext,
		params: UpdateTemplateDeletedParams,
	) -> Result<()>;

	// Users
	async fn get_user_by_id(&self, ctx: &RequestContext, id: UserId) -> Result<User>;
	async fn get_users(&self, ctx: &RequestContext, filter: &UserFilter) -> Result<Vec<User>>;
	async fn insert_user(&self, ctx: &RequestContext, params: InsertUserParams) -> Result<User>;
	async fn update_user_profile(
		&self,
		ctx: &RequestContext,
		params: UpdateUserProfileParams,
	) -> Result<User>;
	async fn update_user_roles(
		&self,
		ctx: &RequestContext,
		params: UpdateUserRolesParams,
	) -> Result<User>;
}
