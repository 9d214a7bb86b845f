// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed store.
//!
//! Identifiers and timestamps are stored as TEXT (UUID strings and RFC 3339).
//! Template ACLs live in side tables, one row per granted action, so that
//! authorized listings can push the translated predicate into the query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_server_rbac::{
	AclTable, GroupId, PermissionAction, Predicate, RequestContext, SqlColumns, UserId,
};
use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow, SqliteSynchronous,
};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::store::Store;
use crate::types::{
	GroupAcl, InsertTemplateParams, InsertUserParams, InsertWorkspaceParams, Template,
	TemplateFilter, TemplateId, UpdateTemplateDeletedParams, UpdateTemplateMetaParams,
	UpdateUserProfileParams, UpdateUserRolesParams, UpdateWorkspaceDeletedParams,
	UpdateWorkspaceParams, User, UserAcl, UserFilter, Workspace, WorkspaceFilter, WorkspaceId,
};

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS users (
		id TEXT PRIMARY KEY,
		username TEXT NOT NULL UNIQUE,
		email TEXT NOT NULL,
		roles TEXT NOT NULL DEFAULT '[]',
		deleted INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS templates (
		id TEXT PRIMARY KEY,
		organization_id TEXT NOT NULL,
		name TEXT NOT NULL,
		description TEXT NOT NULL DEFAULT '',
		created_by TEXT NOT NULL,
		deleted INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS template_user_acl (
		template_id TEXT NOT NULL REFERENCES templates(id) ON DELETE CASCADE,
		user_id TEXT NOT NULL,
		action TEXT NOT NULL,
		PRIMARY KEY (template_id, user_id, action)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS template_group_acl (
		template_id TEXT NOT NULL REFERENCES templates(id) ON DELETE CASCADE,
		group_id TEXT NOT NULL,
		action TEXT NOT NULL,
		PRIMARY KEY (template_id, group_id, action)
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS workspaces (
		id TEXT PRIMARY KEY,
		name TEXT NOT NULL,
		owner_id TEXT NOT NULL,
		organization_id TEXT NOT NULL,
		template_id TEXT NOT NULL,
		deleted INTEGER NOT NULL DEFAULT 0,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_workspaces_owner ON workspaces(owner_id)",
	"CREATE INDEX IF NOT EXISTS idx_workspaces_org ON workspaces(organization_id)",
	"CREATE INDEX IF NOT EXISTS idx_templates_org ON templates(organization_id)",
];

const WORKSPACE_COLUMNS: &str =
	"id, name, owner_id, organization_id, template_id, deleted, created_at, updated_at";
const TEMPLATE_COLUMNS: &str =
	"id, organization_id, name, description, created_by, deleted, created_at, updated_at";
const USER_COLUMNS: &str = "id, username, email, roles, deleted, created_at, updated_at";

/// Column mapping used to translate authorization predicates over workspaces.
pub fn workspace_columns() -> SqlColumns {
	SqlColumns::new("workspaces.id")
		.owner("workspaces.owner_id")
		.org_owner("workspaces.organization_id")
}

/// Column mapping used to translate authorization predicates over templates.
/// Templates have no owner column, so owner conditions never match.
pub fn template_columns() -> SqlColumns {
	SqlColumns::new("templates.id")
		.org_owner("templates.organization_id")
		.acl_users(AclTable::new(
			"template_user_acl",
			"template_id",
			"user_id",
			"action",
		))
		.acl_groups(AclTable::new(
			"template_group_acl",
			"template_id",
			"group_id",
			"action",
		))
}

#[derive(Clone)]
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Opens a pool with WAL mode and creates the schema.
	///
	/// # Errors
	/// Returns `DbError::Internal` if the URL is invalid, or `DbError::Sqlx`
	/// if connecting or migrating fails.
	#[tracing::instrument(skip(database_url))]
	pub async fn connect(database_url: &str) -> Result<Self> {
		let options = SqliteConnectOptions::from_str(database_url)
			.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
			.journal_mode(SqliteJournalMode::Wal)
			.synchronous(SqliteSynchronous::Normal)
			.foreign_keys(true)
			.create_if_missing(true);

		let pool = SqlitePool::connect_with(options).await?;
		let store = Self::new(pool);
		store.migrate().await?;

		tracing::debug!("sqlite store ready");
		Ok(store)
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}

	#[tracing::instrument(skip(self))]
	pub async fn migrate(&self) -> Result<()> {
		for statement in SCHEMA {
			sqlx::query(statement).execute(&self.pool).await?;
		}
		Ok(())
	}

	async fn fetch_workspaces(&self, sql: &str, params: &[String]) -> Result<Vec<Workspace>> {
		let mut query = sqlx::query(sql);
		for param in params {
			query = query.bind(param);
		}
		let rows = query.fetch_all(&self.pool).await?;
		rows.iter().map(row_to_workspace).collect()
	}

	async fn fetch_templates(&self, sql: &str, params: &[String]) -> Result<Vec<Template>> {
		let mut query = sqlx::query(sql);
		for param in params {
			query = query.bind(param);
		}
		let rows = query.fetch_all(&self.pool).await?;

		let mut templates = Vec::with_capacity(rows.len());
		for row in &rows {
			let mut template = row_to_template(row)?;
			self.load_template_acls(&mut template).await?;
			templates.push(template);
		}
		Ok(templates)
	}

	async fn load_template_acls(&self, template: &mut Template) -> Result<()> {
		let id = template.id.to_string();

		let rows = sqlx::query(
			"SELECT user_id, action FROM template_user_acl WHERE template_id = ? ORDER BY user_id, action",
		)
		.bind(&id)
		.fetch_all(&self.pool)
		.await?;
		let mut user_acl = UserAcl::new();
		for row in &rows {
			let user: UserId = parse_id(row.get("user_id"), "template_user_acl.user_id")?;
			user_acl
				.entry(user)
				.or_default()
				.push(parse_action(row.get("action"))?);
		}

		let rows = sqlx::query(
			"SELECT group_id, action FROM template_group_acl WHERE template_id = ? ORDER BY group_id, action",
		)
		.bind(&id)
		.fetch_all(&self.pool)
		.await?;
		let mut group_acl = GroupAcl::new();
		for row in &rows {
			let group: GroupId = parse_id(row.get("group_id"), "template_group_acl.group_id")?;
			group_acl
				.entry(group)
				.or_default()
				.push(parse_action(row.get("action"))?);
		}

		template.user_acl = user_acl;
		template.group_acl = group_acl;
		Ok(())
	}
}

fn workspace_filter_sql(filter: &WorkspaceFilter) -> (String, Vec<String>) {
	let mut sql = format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE 1=1");
	let mut params = Vec::new();
	if let Some(owner) = filter.owner_id {
		sql.push_str(" AND owner_id = ?");
		params.push(owner.to_string());
	}
	if let Some(org) = filter.organization_id {
		sql.push_str(" AND organization_id = ?");
		params.push(org.to_string());
	}
	if !filter.include_deleted {
		sql.push_str(" AND deleted = 0");
	}
	(sql, params)
}

fn template_filter_sql(filter: &TemplateFilter) -> (String, Vec<String>) {
	let mut sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE 1=1");
	let mut params = Vec::new();
	if let Some(org) = filter.organization_id {
		sql.push_str(" AND organization_id = ?");
		params.push(org.to_string());
	}
	if !filter.include_deleted {
		sql.push_str(" AND deleted = 0");
	}
	(sql, params)
}

fn push_predicate(
	sql: &mut String,
	params: &mut Vec<String>,
	predicate: &Predicate,
	columns: &SqlColumns,
) {
	let filter = predicate.to_sql(columns);
	sql.push_str(" AND ");
	sql.push_str(&filter.clause);
	params.extend(filter.params);
}

fn map_unique(err: sqlx::Error, what: &str) -> DbError {
	match &err {
		sqlx::Error::Database(db) if db.is_unique_violation() => {
			DbError::Conflict(format!("{what} already exists"))
		}
		_ => DbError::Sqlx(err),
	}
}

fn parse_id<T>(value: String, column: &str) -> Result<T>
where
	T: From<Uuid>,
{
	Uuid::parse_str(&value)
		.map(T::from)
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))
}

fn parse_time(value: String, column: &str) -> Result<DateTime<Utc>> {
	Ok(DateTime::parse_from_rfc3339(&value)
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))?
		.with_timezone(&Utc))
}

fn parse_action(value: String) -> Result<PermissionAction> {
	value
		.parse()
		.map_err(|e| DbError::Internal(format!("Invalid ACL action: {e}")))
}

fn row_to_workspace(row: &SqliteRow) -> Result<Workspace> {
	let deleted: i64 = row.get("deleted");
	Ok(Workspace {
		id: WorkspaceId::new(parse_id(row.get("id"), "workspace id")?),
		name: row.get("name"),
		owner_id: parse_id(row.get("owner_id"), "owner_id")?,
		organization_id: parse_id(row.get("organization_id"), "organization_id")?,
		template_id: TemplateId::new(parse_id(row.get("template_id"), "template_id")?),
		deleted: deleted != 0,
		created_at: parse_time(row.get("created_at"), "created_at")?,
		updated_at: parse_time(row.get("updated_at"), "updated_at")?,
	})
}

fn row_to_template(row: &SqliteRow) -> Result<Template> {
	let deleted: i64 = row.get("deleted");
	Ok(Template {
		id: TemplateId::new(parse_id(row.get("id"), "template id")?),
		organization_id: parse_id(row.get("organization_id"), "organization_id")?,
		name: row.get("name"),
		description: row.get("description"),
		created_by: parse_id(row.get("created_by"), "created_by")?,
		user_acl: UserAcl::new(),
		group_acl: GroupAcl::new(),
		deleted: deleted != 0,
		created_at: parse_time(row.get("created_at"), "created_at")?,
		updated_at: parse_time(row.get("updated_at"), "updated_at")?,
	})
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
	let deleted: i64 = row.get("deleted");
	let roles: String = row.get("roles");
	Ok(User {
		id: parse_id(row.get("id"), "user id")?,
		username: row.get("username"),
		email: row.get("email"),
		roles: serde_json::from_str(&roles)?,
		deleted: deleted != 0,
		created_at: parse_time(row.get("created_at"), "created_at")?,
		updated_at: parse_time(row.get("updated_at"), "updated_at")?,
	})
}

#[async_trait]
impl Store for SqliteStore {
	#[tracing::instrument(skip(self, _ctx), fields(workspace_id = %id))]
	async fn get_workspace_by_id(&self, _ctx: &RequestContext, id: WorkspaceId) -> Result<Workspace> {
		let row = sqlx::query(&format!(
			"SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?
		.ok_or_else(|| DbError::NotFound(format!("workspace {id}")))?;
		row_to_workspace(&row)
	}

	#[tracing::instrument(skip(self, _ctx))]
	async fn get_workspaces(
		&self,
		_ctx: &RequestContext,
		filter: &WorkspaceFilter,
	) -> Result<Vec<Workspace>> {
		let (mut sql, params) = workspace_filter_sql(filter);
		sql.push_str(" ORDER BY id");
		self.fetch_workspaces(&sql, &params).await
	}

	#[tracing::instrument(skip(self, _ctx, predicate), fields(predicate = %predicate))]
	async fn get_authorized_workspaces(
		&self,
		_ctx: &RequestContext,
		filter: &WorkspaceFilter,
		predicate: &Predicate,
	) -> Result<Vec<Workspace>> {
		let (mut sql, mut params) = workspace_filter_sql(filter);
		push_predicate(&mut sql, &mut params, predicate, &workspace_columns());
		sql.push_str(" ORDER BY id");
		self.fetch_workspaces(&sql, &params).await
	}

	#[tracing::instrument(skip(self, _ctx, params), fields(workspace_id = %params.id))]
	async fn insert_workspace(
		&self,
		_ctx: &RequestContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO workspaces (id, name, owner_id, organization_id, template_id, deleted, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, 0, ?, ?)
			"#,
		)
		.bind(params.id.to_string())
		.bind(&params.name)
		.bind(params.owner_id.to_string())
		.bind(params.organization_id.to_string())
		.bind(params.template_id.to_string())
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| map_unique(e, &format!("workspace {}", params.id)))?;

		Ok(Workspace {
			id: params.id,
			name: params.name,
			owner_id: params.owner_id,
			organization_id: params.organization_id,
			template_id: params.template_id,
			deleted: false,
			created_at: now,
			updated_at: now,
		})
	}

	#[tracing::instrument(skip(self, ctx, params), fields(workspace_id = %params.id))]
	async fn update_workspace(
		&self,
		ctx: &RequestContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace> {
		let result = sqlx::query("UPDATE workspaces SET name = ?, updated_at = ? WHERE id = ?")
			.bind(&params.name)
			.bind(Utc::now().to_rfc3339())
			.bind(params.id.to_string())
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("workspace {}", params.id)));
		}
		self.get_workspace_by_id(ctx, params.id).await
	}

	#[tracing::instrument(skip(self, _ctx), fields(workspace_id = %params.id, deleted = params.deleted))]
	async fn update_workspace_deleted(
		&self,
		_ctx: &RequestContext,
		params: UpdateWorkspaceDeletedParams,
	) -> Result<()> {
		let result = sqlx::query("UPDATE workspaces SET deleted = ?, updated_at = ? WHERE id = ?")
			.bind(params.deleted)
			.bind(Utc::now().to_rfc3339())
			.bind(params.id.to_string())
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("workspace {}", params.id)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, _ctx), fields(template_id = %id))]
	async fn get_template_by_id(&self, _ctx: &RequestContext, id: TemplateId) -> Result<Template> {
		let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?");
		self.fetch_templates(&sql, &[id.to_string()])
			.await?
			.pop()
			.ok_or_else(|| DbError::NotFound(format!("template {id}")))
	}

	#[tracing::instrument(skip(self, _ctx))]
	async fn get_templates(
		&self,
		_ctx: &RequestContext,
		filter: &TemplateFilter,
	) -> Result<Vec<Template>> {
		let (mut sql, params) = template_filter_sql(filter);
		sql.push_str(" ORDER BY id");
		self.fetch_templates(&sql, &params).await
	}

	#[tracing::instrument(skip(self, _ctx, predicate), fields(predicate = %predicate))]
	async fn get_authorized_templates(
		&self,
		_ctx: &RequestContext,
		filter: &TemplateFilter,
		predicate: &Predicate,
	) -> Result<Vec<Template>> {
		let (mut sql, mut params) = template_filter_sql(filter);
		push_predicate(&mut sql, &mut params, predicate, &template_columns());
		sql.push_str(" ORDER BY id");
		self.fetch_templates(&sql, &params).await
	}

	#[tracing::instrument(skip(self, _ctx, params), fields(template_id = %params.id))]
	async fn insert_template(
		&self,
		_ctx: &RequestContext,
		params: InsertTemplateParams,
	) -> Result<Template> {
		let now = Utc::now();
		let id = params.id.to_string();
		let mut tx = self.pool.begin().await?;

		sqlx::query(
			r#"
			INSERT INTO templates (id, organization_id, name, description, created_by, deleted, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, 0, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(params.organization_id.to_string())
		.bind(&params.name)
		.bind(&params.description)
		.bind(params.created_by.to_string())
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&mut *tx)
		.await
		.map_err(|e| map_unique(e, &format!("template {}", params.id)))?;

		for (user, actions) in &params.user_acl {
			for action in actions {
				sqlx::query(
					"INSERT OR IGNORE INTO template_user_acl (template_id, user_id, action) VALUES (?, ?, ?)",
				)
				.bind(&id)
				.bind(user.to_string())
				.bind(action.to_string())
				.execute(&mut *tx)
				.await?;
			}
		}

		for (group, actions) in &params.group_acl {
			for action in actions {
				sqlx::query(
					"INSERT OR IGNORE INTO template_group_acl (template_id, group_id, action) VALUES (?, ?, ?)",
				)
				.bind(&id)
				.bind(group.to_string())
				.bind(action.to_string())
				.execute(&mut *tx)
				.await?;
			}
		}

		tx.commit().await?;

		Ok(Template {
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
		})
	}

	#[tracing::instrument(skip(self, ctx, params), fields(template_id = %params.id))]
	async fn update_template_meta(
		&self,
		ctx: &RequestContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template> {
		let result =
			sqlx::query("UPDATE templates SET name = ?, description = ?, updated_at = ? WHERE id = ?")
				.bind(&params.name)
				.bind(&params.description)
				.bind(Utc::now().to_rfc3339())
				.bind(params.id.to_string())
				.execute(&self.pool)
				.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("template {}", params.id)));
		}
		self.get_template_by_id(ctx, params.id).await
	}

	#[tracing::instrument(skip(self, _ctx), fields(template_id = %params.id, deleted = params.deleted))]
	async fn update_template_deleted(
		&self,
		_ctx: &RequestContext,
		params: UpdateTemplateDeletedParams,
	) -> Result<()> {
		let result = sqlx::query("UPDATE templates SET deleted = ?, updated_at = ? WHERE id = ?")
			.bind(params.deleted)
			.bind(Utc::now().to_rfc3339())
			.bind(params.id.to_string())
			.execute(&self.pool)
			.await?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("template {}", params.id)));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self, _ctx), fields(user_id = %id))]
	async fn get_user_by_id(&self, _ctx: &RequestContext, id: UserId) -> Result<User> {
		let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?
			.ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
		row_to_user(&row)
	}

	#[tracing::instrument(skip(self, _ctx))]
	async fn get_users(&self, _ctx: &RequestContext, filter: &UserFilter) -> Result<Vec<User>> {
		let mut sql = format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1");
		let mut params = Vec::new();
		if let Some(search) = &filter.search {
			sql.push_str(" AND (lower(username) LIKE ? OR lower(email) LIKE ?)");
			let pattern = format!("%{}%", search.to_lowercase());
			params.push(pattern.clone());
			params.push(pattern);
		}
		if !filter.include_deleted {
			sql.push_str(" AND deleted = 0");
		}
		sql.push_str(" ORDER BY id");

		let mut query = sqlx::query(&sql);
		for param in &params {
			query = query.bind(param);
		}
		let rows = query.fetch_all(&self.pool).await?;
		rows.iter().map(row_to_user).collect()
	}

	#[tracing::instrument(skip(self, _ctx, params), fields(user_id = %params.id))]
	async fn insert_user(&self, _ctx: &RequestContext, params: InsertUserParams) -> Result<User> {
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO users (id, username, email, roles, deleted, created_at, updated_at)
			VALUES (?, ?, ?, ?, 0, ?, ?)
			"#,
		)
		.bind(params.id.to_string())
		.bind(&params.username)
		.bind(&params.email)
		.bind(serde_json::to_string(&params.roles)?)
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.execute(&self.pool)
		.await
		.map_err(|e| map_unique(e, &format!("user '{}'", params.username)))?;

		Ok(User {
			id: params.id,
			username: params.username,
			email: params.email,
			roles: params.roles,
			deleted: false,
			created_at: now,
			updated_at: now,
		})
	}

	#[tracing::instrument(skip(self, ctx, params), fields(user_id = %params.id))]
	async fn update_user_profile(
		&self,
		ctx: &RequestContext,
		params: UpdateUserProfileParams,
	) -> Result<User> {
		let result =
			sqlx::query("UPDATE users SET username = ?, email = ?, updated_at = ? WHERE id = ?")
				.bind(&params.username)
				.bind(&params.email)
				.bind(Utc::now().to_rfc3339())
				.bind(params.id.to_string())
				.execute(&self.pool)
				.await
				.map_err(|e| map_unique(e, &format!("user '{}'", params.username)))?;
		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("user {}", params.id)));
		}
		self.get_user_by_id(ctx, params.id).await
	}

	#[tracing::instrument(skip(self, ctx, params), fields(user_id = %params.id))]
	async fn update_user_roles(
		&self,
		ctx: &RequestContext,
		params: UpdateUserRolesParams,
	) -> Result<User> {
		let roles = serde_json::to_string(&params.roles)?;
		let now = Utc::now().to_rfc3339();
		let result = match &params.expected_roles {
			Some(expected) => {
				sqlx::query("UPDATE users SET roles = ?, updated_at = ? WHERE id = ? AND roles = ?")
					.bind(roles)
					.bind(now)
					.bind(params.id.to_string())
					.bind(serde_json::to_string(expected)?)
					.execute(&self.pool)
					.await?
			}
			None => {
				sqlx::query("UPDATE users SET roles = ?, updated_at = ? WHERE id = ?")
					.bind(roles)
					.bind(now)
					.bind(params.id.to_string())
					.execute(&self.pool)
					.await?
			}
		};
		if result.rows_affected() == 0 {
			if params.expected_roles.is_some() {
				// Distinguish a missing row from one whose roles moved on.
				self.get_user_by_id(ctx, params.id).await?;
				return Err(DbError::Conflict(format!(
					"roles of user {} changed concurrently",
					params.id
				)));
			}
			return Err(DbError::NotFound(format!("user {}", params.id)));
		}
		self.get_user_by_id(ctx, params.id).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{
		create_test_store, insert_random_template, insert_random_user, insert_random_workspace,
	};
	use loom_server_rbac::{Action, OrgId};
	use std::collections::BTreeMap;

	#[tokio::test]
	async fn workspace_round_trips_through_sqlite() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();
		let inserted =
			insert_random_workspace(&store, &ctx, UserId::generate(), OrgId::generate()).await;

		let fetched = store.get_workspace_by_id(&ctx, inserted.id).await.unwrap();
		assert_eq!(fetched, inserted);
	}

	#[tokio::test]
	async fn missing_rows_are_not_found() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();

		assert!(store
			.get_workspace_by_id(&ctx, WorkspaceId::generate())
			.await
			.unwrap_err()
			.is_not_found());
		assert!(store
			.update_template_deleted(
				&ctx,
				UpdateTemplateDeletedParams {
					id: TemplateId::generate(),
					deleted: true,
				},
			)
			.await
			.unwrap_err()
			.is_not_found());
	}

	#[tokio::test]
	async fn template_acls_are_reloaded() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();
		let user = UserId::generate();
		let group = GroupId::generate();

		let inserted = store
			.insert_template(
				&ctx,
				InsertTemplateParams {
					id: TemplateId::generate(),
					organization_id: OrgId::generate(),
					name: "go".to_string(),
					description: "Go toolchain".to_string(),
					created_by: user,
					user_acl: BTreeMap::from([(user, vec![PermissionAction::Only(Action::Read)])]),
					group_acl: BTreeMap::from([(group, vec![PermissionAction::All])]),
				},
			)
			.await
			.unwrap();

		let fetched = store.get_template_by_id(&ctx, inserted.id).await.unwrap();
		assert_eq!(fetched, inserted);
	}

	#[tokio::test]
	async fn authorized_templates_use_acl_tables() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();
		let org = OrgId::generate();
		let reader = UserId::generate();

		let shared = store
			.insert_template(
				&ctx,
				InsertTemplateParams {
					id: TemplateId::generate(),
					organization_id: org,
					name: "shared".to_string(),
					description: String::new(),
					created_by: UserId::generate(),
					user_acl: BTreeMap::from([(reader, vec![PermissionAction::Only(Action::Read)])]),
					group_acl: BTreeMap::new(),
				},
			)
			.await
			.unwrap();
		insert_random_template(&store, &ctx, org).await;

		let predicate = Predicate::acl_user(reader, Action::Read);
		let listed = store
			.get_authorized_templates(&ctx, &TemplateFilter::default(), &predicate)
			.await
			.unwrap();
		assert_eq!(listed, vec![shared]);

		let predicate = Predicate::acl_user(reader, Action::Delete);
		let listed = store
			.get_authorized_templates(&ctx, &TemplateFilter::default(), &predicate)
			.await
			.unwrap();
		assert!(listed.is_empty());
	}

	#[tokio::test]
	async fn authorized_workspaces_match_in_memory_predicate() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();
		let me = UserId::generate();
		let my_org = OrgId::generate();
		let other_org = OrgId::generate();

		let mut all = Vec::new();
		for (owner, org) in [
			(me, my_org),
			(UserId::generate(), my_org),
			(me, other_org),
			(UserId::generate(), other_org),
		] {
			all.push(insert_random_workspace(&store, &ctx, owner, org).await);
		}

		let predicate = Predicate::or([
			Predicate::org_owner_in([my_org]),
			Predicate::owner_eq(me),
		]);
		let predicate = Predicate::and([
			predicate,
			Predicate::negate(Predicate::org_owner_in([other_org])),
		]);

		let listed = store
			.get_authorized_workspaces(&ctx, &WorkspaceFilter::default(), &predicate)
			.await
			.unwrap();

		let mut expected: Vec<_> = all
			.into_iter()
			.filter(|w| predicate.matches(&loom_server_rbac::Objecter::rbac_object(w)))
			.collect();
		expected.sort_by_key(|w| w.id.to_string());
		assert_eq!(listed, expected);
		assert_eq!(listed.len(), 2);
	}

	#[tokio::test]
	async fn duplicate_username_conflicts() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();
		let params = InsertUserParams {
			id: UserId::generate(),
			username: "ada".to_string(),
			email: "ada@example.com".to_string(),
			roles: vec!["member".to_string()],
		};
		store.insert_user(&ctx, params.clone()).await.unwrap();

		let err = store
			.insert_user(
				&ctx,
				InsertUserParams {
					id: UserId::generate(),
					..params
				},
			)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn user_roles_are_stored_as_json() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();
		let id = UserId::generate();
		store
			.insert_user(
				&ctx,
				InsertUserParams {
					id,
					username: "grace".to_string(),
					email: "grace@example.com".to_string(),
					roles: vec!["member".to_string()],
				},
			)
			.await
			.unwrap();

		let org = OrgId::generate();
		let updated = store
			.update_user_roles(
				&ctx,
				UpdateUserRolesParams {
					id,
					roles: vec!["member".to_string(), format!("organization-admin:{org}")],
					expected_roles: None,
				},
			)
			.await
			.unwrap();
		assert_eq!(updated.roles.len(), 2);

		let raw: String = sqlx::query_scalar("SELECT roles FROM users WHERE id = ?")
			.bind(id.to_string())
			.fetch_one(store.pool())
			.await
			.unwrap();
		assert!(raw.starts_with('['));
	}

	#[tokio::test]
	async fn conditional_role_update_rejects_stale_roles() {
		let store = create_test_store().await;
		let ctx = RequestContext::anonymous();
		let user = insert_random_user(&store, &ctx, vec!["owner".to_string()]).await;

		let err = store
			.update_user_roles(
				&ctx,
				UpdateUserRolesParams {
					id: user.id,
					roles: vec!["member".to_string()],
					expected_roles: Some(vec!["member".to_string()]),
				},
			)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
		let unchanged = store.get_user_by_id(&ctx, user.id).await.unwrap();
		assert_eq!(unchanged.roles, vec!["owner".to_string()]);

		let err = store
			.update_user_roles(
				&ctx,
				UpdateUserRolesParams {
					id: UserId::generate(),
					roles: vec![],
					expected_roles: Some(vec![]),
				},
			)
			.await
			.unwrap_err();
		assert!(err.is_not_found());

		let updated = store
			.update_user_roles(
				&ctx,
				UpdateUserRolesParams {
					id: user.id,
					roles: vec!["member".to_string()],
					expected_roles: Some(vec!["owner".to_string()]),
				},
			)
			.await
			.unwrap();
		assert_eq!(updated.roles, vec!["member".to_string()]);
	}
}
