// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Protected resources and the parameter types of store operations.
//!
//! Every resource (and every insert parameter set) implements
//! [`Objecter`], projecting itself into the [`Object`] the authorizer
//! decides on.

use chrono::{DateTime, Utc};
use loom_server_rbac::{GroupId, Object, Objecter, OrgId, PermissionAction, ResourceType, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			pub fn into_inner(self) -> Uuid {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(WorkspaceId, "Unique identifier for a workspace.");
define_id_type!(TemplateId, "Unique identifier for a template.");

pub type UserAcl = BTreeMap<UserId, Vec<PermissionAction>>;
pub type GroupAcl = BTreeMap<GroupId, Vec<PermissionAction>>;

// =============================================================================
// Workspaces
// =============================================================================

/// A user's workspace, owned by one user inside one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
	pub id: WorkspaceId,
	pub name: String,
	pub owner_id: UserId,
	pub organization_id: OrgId,
	pub template_id: TemplateId,
	pub deleted: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Objecter for Workspace {
	fn rbac_object(&self) -> Object {
		Object::new(ResourceType::WORKSPACE)
			.with_id(self.id)
			.with_owner(self.owner_id)
			.in_org(self.organization_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertWorkspaceParams {
	pub id: WorkspaceId,
	pub name: String,
	pub owner_id: UserId,
	pub organization_id: OrgId,
	pub template_id: TemplateId,
}

impl Objecter for InsertWorkspaceParams {
	fn rbac_object(&self) -> Object {
		Object::new(ResourceType::WORKSPACE)
			.with_id(self.id)
			.with_owner(self.owner_id)
			.in_org(self.organization_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateWorkspaceParams {
	pub id: WorkspaceId,
	pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateWorkspaceDeletedParams {
	pub id: WorkspaceId,
	pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceFilter {
	pub owner_id: Option<UserId>,
	pub organization_id: Option<OrgId>,
	pub include_deleted: bool,
}

impl WorkspaceFilter {
	pub fn matches(&self, workspace: &Workspace) -> bool {
		self.owner_id.map_or(true, |id| workspace.owner_id == id)
			&& self
				.organization_id
				.map_or(true, |id| workspace.organization_id == id)
			&& (self.include_deleted || !workspace.deleted)
	}
}

// =============================================================================
// Templates
// =============================================================================

/// A workspace template, owned by an organization and shared through ACLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
	pub id: TemplateId,
	pub organization_id: OrgId,
	pub name: String,
	pub description: String,
	pub created_by: UserId,
	#[serde(default)]
	pub user_acl: UserAcl,
	#[serde(default)]
	pub group_acl: GroupAcl,
	pub deleted: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Templates belong to their organization, not to the user who created them.
impl Objecter for Template {
	fn rbac_object(&self) -> Object {
		Object::new(ResourceType::TEMPLATE)
			.with_id(self.id)
			.in_org(self.organization_id)
			.with_acl_user_list(self.user_acl.clone())
			.with_acl_group_list(self.group_acl.clone())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertTemplateParams {
	pub id: TemplateId,
	pub organization_id: OrgId,
	pub name: String,
	pub description: String,
	pub created_by: UserId,
	pub user_acl: UserAcl,
	pub group_acl: GroupAcl,
}

impl Objecter for InsertTemplateParams {
	fn rbac_object(&self) -> Object {
		Object::new(ResourceType::TEMPLATE)
			.with_id(self.id)
			.in_org(self.organization_id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTemplateMetaParams {
	pub id: TemplateId,
	pub name: String,
	pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTemplateDeletedParams {
	pub id: TemplateId,
	pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateFilter {
	pub organization_id: Option<OrgId>,
	pub include_deleted: bool,
}

impl TemplateFilter {
	pub fn matches(&self, template: &Template) -> bool {
		self.organization_id
			.map_or(true, |id| template.organization_id == id)
			&& (self.include_deleted || !template.deleted)
	}
}

// =============================================================================
// Users
// =============================================================================

/// A user account. `roles` holds role names, including organization roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub username: String,
	pub email: String,
	pub roles: Vec<String>,
	pub deleted: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A user owns its own record.
impl Objecter for User {
	fn rbac_object(&self) -> Object {
		Object::new(ResourceType::USER)
			.with_id(self.id)
			.with_owner(self.id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertUserParams {
	pub id: UserId,
	pub username: String,
	pub email: String,
	pub roles: Vec<String>,
}

/// New accounts are not owned by anyone yet, so creating one is a site decision.
impl Objecter for InsertUserParams {
	fn rbac_object(&self) -> Object {
		Object::new(ResourceType::USER).with_id(self.id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserProfileParams {
	pub id: UserId,
	pub username: String,
	pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserRolesParams {
	pub id: UserId,
	pub roles: Vec<String>,
	/// When set, the write only applies if the stored roles still equal
	/// these; otherwise it fails with `DbError::Conflict`.
	pub expected_roles: Option<Vec<String>>,
}

impl UpdateUserRolesParams {
	/// The role-assignment object guarding a user's roles. It carries no
	/// owner, so user-level permissions never let a user grant itself roles.
	pub fn assignment_object(&self) -> Object {
		Object::new(ResourceType::ROLE_ASSIGNMENT).with_id(self.id)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
	/// Case-insensitive substring of username or email.
	pub search: Option<String>,
	pub include_deleted: bool,
}

impl UserFilter {
	pub fn matches(&self, user: &User) -> bool {
		let search_ok = match &self.search {
			Some(needle) => {
				let needle = needle.to_lowercase();
				user.username.to_lowercase().contains(&needle)
					|| user.email.to_lowercase().contains(&needle)
			}
			None => true,
		};
		search_ok && (self.include_deleted || !user.deleted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_server_rbac::Action;
	use proptest::prelude::*;

	fn workspace(owner: UserId, org: OrgId) -> Workspace {
		let now = Utc::now();
		Workspace {
			id: WorkspaceId::generate(),
			name: "dev".to_string(),
			owner_id: owner,
			organization_id: org,
			template_id: TemplateId::generate(),
			deleted: false,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn workspace_projects_owner_and_org() {
		let owner = UserId::generate();
		let org = OrgId::generate();
		let ws = workspace(owner, org);
		let object = ws.rbac_object();
		assert_eq!(object.resource_type, ResourceType::WORKSPACE);
		assert_eq!(object.resource_id, Some(ws.id.into_inner()));
		assert_eq!(object.owner, Some(owner));
		assert_eq!(object.org_owner, Some(org));
	}

	#[test]
	fn template_projects_acls_without_owner() {
		let user = UserId::generate();
		let now = Utc::now();
		let template = Template {
			id: TemplateId::generate(),
			organization_id: OrgId::generate(),
			name: "rust".to_string(),
			description: String::new(),
			created_by: user,
			user_acl: BTreeMap::from([(user, vec![PermissionAction::Only(Action::Update)])]),
			group_acl: BTreeMap::new(),
			deleted: false,
			created_at: now,
			updated_at: now,
		};
		let object = template.rbac_object();
		assert_eq!(object.owner, None);
		assert!(object.acl_grants_user(&user, Action::Update));
	}

	#[test]
	fn user_owns_itself() {
		let now = Utc::now();
		let user = User {
			id: UserId::generate(),
			username: "ada".to_string(),
			email: "ada@example.com".to_string(),
			roles: vec!["member".to_string()],
			deleted: false,
			created_at: now,
			updated_at: now,
		};
		assert_eq!(user.rbac_object().owner, Some(user.id));
	}

	#[test]
	fn role_assignment_object_has_no_owner() {
		let params = UpdateUserRolesParams {
			id: UserId::generate(),
			roles: vec![],
			expected_roles: None,
		};
		let object = params.assignment_object();
		assert_eq!(object.resource_type, ResourceType::ROLE_ASSIGNMENT);
		assert_eq!(object.owner, None);
	}

	#[test]
	fn workspace_filter_hides_deleted_by_default() {
		let owner = UserId::generate();
		let org = OrgId::generate();
		let mut ws = workspace(owner, org);
		ws.deleted = true;

		assert!(!WorkspaceFilter::default().matches(&ws));
		assert!(WorkspaceFilter {
			include_deleted: true,
			..Default::default()
		}
		.matches(&ws));
		assert!(!WorkspaceFilter {
			owner_id: Some(UserId::generate()),
			include_deleted: true,
			..Default::default()
		}
		.matches(&ws));
	}

	#[test]
	fn user_filter_searches_case_insensitively() {
		let now = Utc::now();
		let user = User {
			id: UserId::generate(),
			username: "Grace".to_string(),
			email: "grace@example.com".to_string(),
			roles: vec![],
			deleted: false,
			created_at: now,
			updated_at: now,
		};
		let filter = UserFilter {
			search: Some("GRA".to_string()),
			include_deleted: false,
		};
		assert!(filter.matches(&user));
		let filter = UserFilter {
			search: Some("hopper".to_string()),
			include_deleted: false,
		};
		assert!(!filter.matches(&user));
	}

	proptest! {
		#[test]
		fn user_filter_matches_any_slice_of_username(
			name in "[a-zA-Z0-9]{1,16}",
			start in 0usize..16,
			len in 1usize..16,
		) {
			let start = start % name.len();
			let end = (start + len).min(name.len());
			let now = Utc::now();
			let user = User {
				id: UserId::generate(),
				username: name.clone(),
				email: "someone@example.com".to_string(),
				roles: vec![],
				deleted: false,
				created_at: now,
				updated_at: now,
			};
			let filter = UserFilter {
				search: Some(name[start..end].to_uppercase()),
				include_deleted: false,
			};
			prop_assert!(filter.matches(&user));
		}
	}
}
