// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory store.
//!
//! Holds every resource in ordered maps behind a single async read-write
//! lock. Listings are returned in id order.

use async_trait::async_trait;
use chrono::Utc;
use loom_server_rbac::{Objecter, Predicate, RequestContext, UserId};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{DbError, Result};
use crate::store::Store;
use crate::types::{
	InsertTemplateParams, InsertUserParams, InsertWorkspaceParams, Template, TemplateFilter,
	TemplateId, UpdateTemplateDeletedParams, UpdateTemplateMetaParams, UpdateUserProfileParams,
	UpdateUserRolesParams, UpdateWorkspaceDeletedParams, UpdateWorkspaceParams, User, UserFilter,
	Workspace, WorkspaceFilter, WorkspaceId,
};

#[derive(Debug, Default)]
struct Tables {
	workspaces: BTreeMap<WorkspaceId, Workspace>,
	templates: BTreeMap<TemplateId, Template>,
	users: BTreeMap<UserId, User>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
	tables: RwLock<Tables>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl Store for MemoryStore {
	async fn get_workspace_by_id(&self, _ctx: &RequestContext, id: WorkspaceId) -> Result<Workspace> {
		self.tables
			.read()
			.await
			.workspaces
			.get(&id)
			.cloned()
			.ok_or_else(|| DbError::NotFound(format!("workspace {id}")))
	}

	async fn get_workspaces(
		&self,
		_ctx: &RequestContext,
		filter: &WorkspaceFilter,
	) -> Result<Vec<Workspace>> {
		let tables = self.tables.read().await;
		Ok(tables
			.workspaces
			.values()
			.filter(|w| filter.matches(w))
			.cloned()
			.collect())
	}

	async fn get_authorized_workspaces(
		&self,
		_ctx: &RequestContext,
		filter: &WorkspaceFilter,
		predicate: &Predicate,
	) -> Result<Vec<Workspace>> {
		let tables = self.tables.read().await;
		Ok(tables
			.workspaces
			.values()
			.filter(|w| filter.matches(w) && predicate.matches(&w.rbac_object()))
			.cloned()
			.collect())
	}

	async fn insert_workspace(
		&self,
		_ctx: &RequestContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace> {
		let mut tables = self.tables.write().await;
		if tables.workspaces.contains_key(&params.id) {
			return Err(DbError::Conflict(format!("workspace {} already exists", params.id)));
		}

		let now = Utc::now();
		let workspace = Workspace {
			id: params.id,
			name: params.name,
			owner_id: params.owner_id,
			organization_id: params.organization_id,
			template_id: params.template_id,
			deleted: false,
			created_at: now,
			updated_at: now,
		};
		tables.workspaces.insert(workspace.id, workspace.clone());
		Ok(workspace)
	}

	async fn update_workspace(
		&self,
		_ctx: &RequestContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace> {
		let mut tables = self.tables.write().await;
		let workspace = tables
			.workspaces
			.get_mut(&params.id)
			.ok_or_else(|| DbError::NotFound(format!("workspace {}", params.id)))?;
		workspace.name = params.name;
		workspace.updated_at = Utc::now();
		Ok(workspace.clone())
	}

	async fn update_workspace_deleted(
		&self,
		_ctx: &RequestContext,
		params: UpdateWorkspaceDeletedParams,
	) -> Result<()> {
		let mut tables = self.tables.write().await;
		let workspace = tables
			.workspaces
			.get_mut(&params.id)
			.ok_or_else(|| DbError::NotFound(format!("workspace {}", params.id)))?;
		workspace.deleted = params.deleted;
		workspace.updated_at = Utc::now();
		Ok(())
	}

	async fn get_template_by_id(&self, _ctx: &RequestContext, id: TemplateId) -> Result<Template> {
		self.tables
			.read()
			.await
			.templates
			.get(&id)
			.cloned()
			.ok_or_else(|| DbError::NotFound(format!("template {id}")))
	}

	async fn get_templates(
		&self,
		_ctx: &RequestContext,
		filter: &TemplateFilter,
	) -> Result<Vec<Template>> {
		let tables = self.tables.read().await;
		Ok(tables
			.templates
			.values()
			.filter(|t| filter.matches(t))
			.cloned()
			.collect())
	}

	async fn get_authorized_templates(
		&self,
		_ctx: &RequestContext,
		filter: &TemplateFilter,
		predicate: &Predicate,
	) -> Result<Vec<Template>> {
		let tables = self.tables.read().await;
		Ok(tables
			.templates
			.values()
			.filter(|t| filter.matches(t) && predicate.matches(&t.rbac_object()))
			.cloned()
			.collect())
	}

	async fn insert_template(
		&self,
		_ctx: &RequestContext,
		params: InsertTemplateParams,
	) -> Result<Template> {
		let mut tables = self.tables.write().await;
		if tables.templates.contains_key(&params.id) {
			return Err(DbError::Conflict(format!("template {} already exists", params.id)));
		}

		let now = Utc::now();
		let template = Template {
			id: params.id,
			organization_id: params.organization_id,
			name: params.name,
			description: params.description,
			created_by: params.created_by,
			user_acl: params.user_acl,
			group_acl: params.group_acl,
			deleted: false,
			created_at: now,
			updated_at: now,
		};
		tables.templates.insert(template.id, template.clone());
		Ok(template)
	}

	async fn update_template_meta(
		&self,
		_ctx: &RequestContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template> {
		let mut tables = self.tables.write().await;
		let template = tables
			.templates
			.get_mut(&params.id)
			.ok_or_else(|| DbError::NotFound(format!("template {}", params.id)))?;
		template.name = params.name;
		template.description = params.description;
		template.updated_at = Utc::now();
		Ok(template.clone())
	}

	async fn update_template_deleted(
		&self,
		_ctx: &RequestContext,
		params: UpdateTemplateDeletedParams,
	) -> Result<()> {
		let mut tables = self.tables.write().await;
		let template = tables
			.templates
			.get_mut(&params.id)
			.ok_or_else(|| DbError::NotFound(format!("template {}", params.id)))?;
		template.deleted = params.deleted;
		template.updated_at = Utc::now();
		Ok(())
	}

	async fn get_user_by_id(&self, _ctx: &RequestContext, id: UserId) -> Result<User> {
		self.tables
			.read()
			.await
			.users
			.get(&id)
			.cloned()
			.ok_or_else(|| DbError::NotFound(format!("user {id}")))
	}

	async fn get_users(&self, _ctx: &RequestContext, filter: &UserFilter) -> Result<Vec<User>> {
		let tables = self.tables.read().await;
		Ok(tables
			.users
			.values()
			.filter(|u| filter.matches(u))
			.cloned()
			.collect())
	}

	async fn insert_user(&self, _ctx: &RequestContext, params: InsertUserParams) -> Result<User> {
		let mut tables = self.tables.write().await;
		if tables.users.contains_key(&params.id) {
			return Err(DbError::Conflict(format!("user {} already exists", params.id)));
		}
		if tables.users.values().any(|u| u.username == params.username) {
			return Err(DbError::Conflict(format!(
				"username '{}' is taken",
				params.username
			)));
		}

		let now = Utc::now();
		let user = User {
			id: params.id,
			username: params.username,
			email: params.email,
			roles: params.roles,
			deleted: false,
			created_at: now,
			updated_at: now,
		};
		tables.users.insert(user.id, user.clone());
		Ok(user)
	}

	async fn update_user_profile(
		&self,
		_ctx: &RequestContext,
		params: UpdateUserProfileParams,
	) -> Result<User> {
		let mut tables = self.tables.write().await;
		if tables
			.users
			.values()
			.any(|u| u.id != params.id && u.username == params.username)
		{
			return Err(DbError::Conflict(format!(
				"username '{}' is taken",
				params.username
			)));
		}

		let user = tables
			.users
			.get_mut(&params.id)
			.ok_or_else(|| DbError::NotFound(format!("user {}", params.id)))?;
		user.username = params.username;
		user.email = params.email;
		user.updated_at = Utc::now();
		Ok(user.clone())
	}

	async fn update_user_roles(
		&self,
		_ctx: &RequestContext,
		params: UpdateUserRolesParams,
	) -> Result<User> {
		let mut tables = self.tables.write().await;
		let user = tables
			.users
			.get_mut(&params.id)
			.ok_or_else(|| DbError::NotFound(format!("user {}", params.id)))?;
		if let Some(expected) = &params.expected_roles {
			if *expected != user.roles {
				return Err(DbError::Conflict(format!(
					"roles of user {} changed concurrently",
					params.id
				)));
			}
		}
		user.roles = params.roles;
		user.updated_at = Utc::now();
		Ok(user.clone())
	}
}
