// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authorizing store wrapper.
//!
//! [`AuthzQuerier`] implements the full [`Store`] surface over any inner
//! store. Each operation goes through one of a handful of shared routines:
//!
//! - `fetch`: load, then authorize `read` on the loaded object
//! - `fetch_list`: load, then keep only the objects the subject may read
//! - `insert`: authorize `create` on the projected params, then create
//! - `update` / `delete`: load the existing object, authorize, then mutate
//!
//! Authorization always completes before a mutation starts. A cancelled
//! context stops the next store call from starting and aborts one in flight.

use async_trait::async_trait;
use loom_server_db::{
	DbError, InsertTemplateParams, InsertUserParams, InsertWorkspaceParams, Result, Store, Template,
	TemplateFilter, TemplateId, UpdateTemplateDeletedParams, UpdateTemplateMetaParams,
	UpdateUserProfileParams, UpdateUserRolesParams, UpdateWorkspaceDeletedParams,
	UpdateWorkspaceParams, User, UserFilter, Workspace, WorkspaceFilter, WorkspaceId,
};
use loom_server_rbac::{
	can_assign_role, filter, Action, Authorizer, ForbiddenError, Object, Objecter, Predicate,
	RbacError, RequestContext, ResourceType, Subject, UserId,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

/// A [`Store`] whose every operation is authorized.
///
/// Code holding an `AuthzStore` cannot reach protected data without a
/// decision being made for the subject in its [`RequestContext`].
pub trait AuthzStore: Store {}

pub struct AuthzQuerier<S> {
	inner: S,
	authorizer: Arc<dyn Authorizer>,
}

impl<S: Store> AuthzStore for AuthzQuerier<S> {}

impl<S: Store> AuthzQuerier<S> {
	pub fn new(inner: S, authorizer: Arc<dyn Authorizer>) -> Self {
		Self { inner, authorizer }
	}

	/// The wrapped store. Calls made through it are not authorized.
	pub fn inner(&self) -> &S {
		&self.inner
	}

	pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
		&self.authorizer
	}

	async fn fetch<T, F>(&self, ctx: &RequestContext, load: F) -> Result<T>
	where
		T: Objecter,
		F: Future<Output = Result<T>>,
	{
		let subject = ctx.require_subject()?;
		let item = run(ctx, load).await?;
		self.authorizer
			.authorize(subject, Action::Read, &item.rbac_object())?;
		Ok(item)
	}

	async fn fetch_list<T, F>(&self, ctx: &RequestContext, load: F) -> Result<Vec<T>>
	where
		T: Objecter + Clone,
		F: Future<Output = Result<Vec<T>>>,
	{
		let subject = ctx.require_subject()?;
		let items = run(ctx, load).await?;
		Ok(filter(self.authorizer.as_ref(), subject, Action::Read, &items)?)
	}

	/// Store-side filtering: the subject's partial predicate is ANDed with
	/// the caller's, so a caller can only narrow what it sees.
	fn authorized_predicate(
		&self,
		ctx: &RequestContext,
		resource_type: &ResourceType,
		predicate: &Predicate,
	) -> Result<Predicate> {
		let subject = ctx.require_subject()?;
		let allowed = self.authorizer.partial(subject, Action::Read, resource_type)?;
		Ok(Predicate::and([allowed, predicate.clone()]))
	}

	async fn insert<T, F>(&self, ctx: &RequestContext, object: Object, create: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let subject = ctx.require_subject()?;
		self.authorizer.authorize(subject, Action::Create, &object)?;
		run(ctx, create).await
	}

	async fn update<O, T, L, M>(&self, ctx: &RequestContext, load: L, mutate: M) -> Result<T>
	where
		O: Objecter,
		L: Future<Output = Result<O>>,
		M: Future<Output = Result<T>>,
	{
		self.load_then_mutate(ctx, Action::Update, load, mutate).await
	}

	async fn delete<O, T, L, M>(&self, ctx: &RequestContext, load: L, mutate: M) -> Result<T>
	where
		O: Objecter,
		L: Future<Output = Result<O>>,
		M: Future<Output = Result<T>>,
	{
		self.load_then_mutate(ctx, Action::Delete, load, mutate).await
	}

	async fn load_then_mutate<O, T, L, M>(
		&self,
		ctx: &RequestContext,
		action: Action,
		load: L,
		mutate: M,
	) -> Result<T>
	where
		O: Objecter,
		L: Future<Output = Result<O>>,
		M: Future<Output = Result<T>>,
	{
		let subject = ctx.require_subject()?;
		let existing = run(ctx, load).await?;
		self.authorizer
			.authorize(subject, action, &existing.rbac_object())?;
		run(ctx, mutate).await
	}
}

/// Runs one inner store call under the context's cancellation token.
async fn run<T, F>(ctx: &RequestContext, operation: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	if ctx.is_cancelled() {
		return Err(DbError::Canceled);
	}

	tokio::select! {
		biased;
		_ = ctx.cancellation_token().cancelled() => Err(DbError::Canceled),
		result = operation => result,
	}
}

/// Every role added or removed between `before` and `after` must be one the
/// subject is allowed to assign.
fn check_role_changes(
	subject: &Subject,
	object: &Object,
	before: &[String],
	after: &[String],
) -> std::result::Result<(), RbacError> {
	let before: BTreeSet<&str> = before.iter().map(String::as_str).collect();
	let after: BTreeSet<&str> = after.iter().map(String::as_str).collect();
	let actor_roles = subject.role_names();

	for role in before.symmetric_difference(&after) {
		if !can_assign_role(&actor_roles, role) {
			tracing::debug!(
				subject_id = %subject.id(),
				role = %role,
				"role assignment denied"
			);
			return Err(RbacError::forbidden(ForbiddenError::new(
				subject.id(),
				actor_roles.clone(),
				subject.scope().as_str(),
				Action::Update,
				object.clone(),
				format!("roles {actor_roles:?} cannot assign '{role}'"),
			)));
		}
	}
	Ok(())
}

#[async_trait]
impl<S: Store> Store for AuthzQuerier<S> {
	#[tracing::instrument(skip_all, fields(workspace_id = %id))]
	async fn get_workspace_by_id(&self, ctx: &RequestContext, id: WorkspaceId) -> Result<Workspace> {
		self.fetch(ctx, self.inner.get_workspace_by_id(ctx, id))
			.await
	}

	#[tracing::instrument(skip_all)]
	async fn get_workspaces(
		&self,
		ctx: &RequestContext,
		filter: &WorkspaceFilter,
	) -> Result<Vec<Workspace>> {
		self.fetch_list(ctx, self.inner.get_workspaces(ctx, filter))
			.await
	}

	#[tracing::instrument(skip_all, fields(predicate = %predicate))]
	async fn get_authorized_workspaces(
		&self,
		ctx: &RequestContext,
		filter: &WorkspaceFilter,
		predicate: &Predicate,
	) -> Result<Vec<Workspace>> {
		let predicate = self.authorized_predicate(ctx, &ResourceType::WORKSPACE, predicate)?;
		run(
			ctx,
			self.inner.get_authorized_workspaces(ctx, filter, &predicate),
		)
		.await
	}

	#[tracing::instrument(skip_all, fields(workspace_id = %params.id, owner_id = %params.owner_id))]
	async fn insert_workspace(
		&self,
		ctx: &RequestContext,
		params: InsertWorkspaceParams,
	) -> Result<Workspace> {
		let object = params.rbac_object();
		self.insert(ctx, object, self.inner.insert_workspace(ctx, params))
			.await
	}

	#[tracing::instrument(skip_all, fields(workspace_id = %params.id))]
	async fn update_workspace(
		&self,
		ctx: &RequestContext,
		params: UpdateWorkspaceParams,
	) -> Result<Workspace> {
		let id = params.id;
		self.update(
			ctx,
			self.inner.get_workspace_by_id(ctx, id),
			self.inner.update_workspace(ctx, params),
		)
		.await
	}

	#[tracing::instrument(skip_all, fields(workspace_id = %params.id, deleted = params.deleted))]
	async fn update_workspace_deleted(
		&self,
		ctx: &RequestContext,
		params: UpdateWorkspaceDeletedParams,
	) -> Result<()> {
		self.delete(
			ctx,
			self.inner.get_workspace_by_id(ctx, params.id),
			self.inner.update_workspace_deleted(ctx, params),
		)
		.await
	}

	#[tracing::instrument(skip_all, fields(template_id = %id))]
	async fn get_template_by_id(&self, ctx: &RequestContext, id: TemplateId) -> Result<Template> {
		self.fetch(ctx, self.inner.get_template_by_id(ctx, id))
			.await
	}

	#[tracing::instrument(skip_all)]
	async fn get_templates(
		&self,
		ctx: &RequestContext,
		filter: &TemplateFilter,
	) -> Result<Vec<Template>> {
		self.fetch_list(ctx, self.inner.get_templates(ctx, filter))
			.await
	}

	#[tracing::instrument(skip_all, fields(predicate = %predicate))]
	async fn get_authorized_templates(
		&self,
		ctx: &RequestContext,
		filter: &TemplateFilter,
		predicate: &Predicate,
	) -> Result<Vec<Template>> {
		let predicate = self.authorized_predicate(ctx, &ResourceType::TEMPLATE, predicate)?;
		run(
			ctx,
			self.inner.get_authorized_templates(ctx, filter, &predicate),
		)
		.await
	}

	#[tracing::instrument(skip_all, fields(template_id = %params.id, organization_id = %params.organization_id))]
	async fn insert_template(
		&self,
		ctx: &RequestContext,
		params: InsertTemplateParams,
	) -> Result<Template> {
		let object = params.rbac_object();
		self.insert(ctx, object, self.inner.insert_template(ctx, params))
			.await
	}

	#[tracing::instrument(skip_all, fields(template_id = %params.id))]
	async fn update_template_meta(
		&self,
		ctx: &RequestContext,
		params: UpdateTemplateMetaParams,
	) -> Result<Template> {
		let id = params.id;
		self.update(
			ctx,
			self.inner.get_template_by_id(ctx, id),
			self.inner.update_template_meta(ctx, params),
		)
		.await
	}

	#[tracing::instrument(skip_all, fields(template_id = %params.id, deleted = params.deleted))]
	async fn update_template_deleted(
		&self,
		ctx: &RequestContext,
		params: UpdateTemplateDeletedParams,
	) -> Result<()> {
		self.delete(
			ctx,
			self.inner.get_template_by_id(ctx, params.id),
			self.inner.update_template_deleted(ctx, params),
		)
		.await
	}

	#[tracing::instrument(skip_all, fields(user_id = %id))]
	async fn get_user_by_id(&self, ctx: &RequestContext, id: UserId) -> Result<User> {
		self.fetch(ctx, self.inner.get_user_by_id(ctx, id)).await
	}

	#[tracing::instrument(skip_all)]
	async fn get_users(&self, ctx: &RequestContext, filter: &UserFilter) -> Result<Vec<User>> {
		self.fetch_list(ctx, self.inner.get_users(ctx, filter))
			.await
	}

	/// Creating a user with initial roles counts as assigning them.
	#[tracing::instrument(skip_all, fields(user_id = %params.id))]
	async fn insert_user(&self, ctx: &RequestContext, params: InsertUserParams) -> Result<User> {
		let subject = ctx.require_subject()?;
		let object = params.rbac_object();
		check_role_changes(subject, &object, &[], &params.roles)?;
		self.insert(ctx, object, self.inner.insert_user(ctx, params))
			.await
	}

	#[tracing::instrument(skip_all, fields(user_id = %params.id))]
	async fn update_user_profile(
		&self,
		ctx: &RequestContext,
		params: UpdateUserProfileParams,
	) -> Result<User> {
		let id = params.id;
		self.update(
			ctx,
			self.inner.get_user_by_id(ctx, id),
			self.inner.update_user_profile(ctx, params),
		)
		.await
	}

	/// Authorized on the user's role-assignment object rather than the user,
	/// and every added or removed role must be assignable by the subject.
	#[tracing::instrument(skip_all, fields(user_id = %params.id))]
	async fn update_user_roles(
		&self,
		ctx: &RequestContext,
		mut params: UpdateUserRolesParams,
	) -> Result<User> {
		let subject = ctx.require_subject()?;
		let existing = run(ctx, self.inner.get_user_by_id(ctx, params.id)).await?;

		let object = params.assignment_object();
		self.authorizer.authorize(subject, Action::Update, &object)?;
		check_role_changes(subject, &object, &existing.roles, &params.roles)?;

		// The change set was authorized against `existing`; only write over it.
		if let Some(expected) = &params.expected_roles {
			if *expected != existing.roles {
				return Err(DbError::Conflict(format!(
					"roles of user {} changed concurrently",
					params.id
				)));
			}
		}
		params.expected_roles = Some(existing.roles);

		run(ctx, self.inner.update_user_roles(ctx, params)).await
	}
}
