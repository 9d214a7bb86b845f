// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Roles, permissions and the role registry.
//!
//! A [`Role`] is a named bundle of [`Permission`]s split by the level they
//! apply at:
//!
//! - **site**: applies to every object regardless of owner or organization
//! - **org**: applies to objects owned by one specific organization
//! - **user**: applies to objects owned by the subject itself
//!
//! Built-in roles are registered once in a process-wide [`RoleRegistry`] and
//! looked up by name with [`role_by_name`]. Organization roles are
//! parameterised by the organization they apply to and are named
//! `<base>:<org-uuid>` (for example `organization-admin:6f1c...`).
//!
//! Tests and the policy artifact can also supply roles directly; see
//! [`ExpandableRoles`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use crate::error::RbacError;
use crate::types::{Action, Effect, OrgId, PermissionAction, ResourceType};

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_MEMBER: &str = "member";
pub const ROLE_AUDITOR: &str = "auditor";
pub const ROLE_TEMPLATE_ADMIN: &str = "template-admin";
pub const ROLE_USER_ADMIN: &str = "user-admin";
pub const ROLE_ORG_ADMIN: &str = "organization-admin";
pub const ROLE_ORG_MEMBER: &str = "organization-member";

/// Separator between an organization role's base name and its organization.
const ORG_ROLE_SEPARATOR: char = ':';

pub fn role_owner() -> String {
	ROLE_OWNER.to_string()
}

pub fn role_member() -> String {
	ROLE_MEMBER.to_string()
}

pub fn role_auditor() -> String {
	ROLE_AUDITOR.to_string()
}

pub fn role_template_admin() -> String {
	ROLE_TEMPLATE_ADMIN.to_string()
}

pub fn role_user_admin() -> String {
	ROLE_USER_ADMIN.to_string()
}

pub fn role_org_admin(org_id: OrgId) -> String {
	format!("{ROLE_ORG_ADMIN}{ORG_ROLE_SEPARATOR}{org_id}")
}

pub fn role_org_member(org_id: OrgId) -> String {
	format!("{ROLE_ORG_MEMBER}{ORG_ROLE_SEPARATOR}{org_id}")
}

// =============================================================================
// Permissions
// =============================================================================

/// A single (resource type, action, effect) rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
	pub resource_type: ResourceType,
	pub action: PermissionAction,
	#[serde(default)]
	pub effect: Effect,
}

impl Permission {
	pub fn allow(resource_type: ResourceType, action: impl Into<PermissionAction>) -> Self {
		Self {
			resource_type,
			action: action.into(),
			effect: Effect::Allow,
		}
	}

	pub fn deny(resource_type: ResourceType, action: impl Into<PermissionAction>) -> Self {
		Self {
			resource_type,
			action: action.into(),
			effect: Effect::Deny,
		}
	}

	/// Returns true if this permission applies to `action` on `resource_type`.
	pub fn matches(&self, resource_type: &ResourceType, action: Action) -> bool {
		self.resource_type.covers(resource_type) && self.action.covers(action)
	}
}

/// Shorthand for the `*`/`*` allow permission.
fn allow_all() -> Permission {
	Permission::allow(ResourceType::WILDCARD, PermissionAction::All)
}

// =============================================================================
// Roles
// =============================================================================

/// A materialized role: its permission sets are fixed once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
	pub name: String,
	#[serde(default)]
	pub display_name: String,
	#[serde(default)]
	pub site: Vec<Permission>,
	/// Org-level permissions keyed by the organization they apply in.
	#[serde(default)]
	pub org: BTreeMap<OrgId, Vec<Permission>>,
	#[serde(default)]
	pub user: Vec<Permission>,
}

impl Role {
	/// Creates a custom role with no permissions.
	///
	/// Custom roles bypass the registry entirely; they exist so tests can
	/// exercise edge cases that no built-in role expresses.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			display_name: String::new(),
			site: Vec::new(),
			org: BTreeMap::new(),
			user: Vec::new(),
		}
	}

	/// Builder: set site-level permissions.
	pub fn with_site(mut self, permissions: Vec<Permission>) -> Self {
		self.site = permissions;
		self
	}

	/// Builder: set org-level permissions for one organization.
	pub fn with_org(mut self, org_id: OrgId, permissions: Vec<Permission>) -> Self {
		self.org.insert(org_id, permissions);
		self
	}

	/// Builder: set user-level permissions.
	pub fn with_user(mut self, permissions: Vec<Permission>) -> Self {
		self.user = permissions;
		self
	}

	/// Organizations this role grants org-level permissions in.
	pub fn organizations(&self) -> impl Iterator<Item = &OrgId> {
		self.org.keys()
	}
}

/// The registered definition of a role, before it is bound to an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTemplate {
	pub name: String,
	#[serde(default)]
	pub display_name: String,
	#[serde(default)]
	pub site: Vec<Permission>,
	/// Applied in the organization named by the role suffix.
	#[serde(default)]
	pub org: Vec<Permission>,
	#[serde(default)]
	pub user: Vec<Permission>,
	/// Organization roles must be referenced as `<name>:<org-uuid>`.
	#[serde(default)]
	pub org_scoped: bool,
}

impl RoleTemplate {
	fn materialize(&self, org_id: Option<OrgId>) -> Role {
		let mut org = BTreeMap::new();
		let name = match org_id {
			Some(org_id) => {
				org.insert(org_id, self.org.clone());
				format!("{}{ORG_ROLE_SEPARATOR}{org_id}", self.name)
			}
			None => self.name.clone(),
		};

		Role {
			name,
			display_name: self.display_name.clone(),
			site: self.site.clone(),
			org,
			user: self.user.clone(),
		}
	}
}

// =============================================================================
// Registry
// =============================================================================

static BUILTIN_REGISTRY: LazyLock<RoleRegistry> = LazyLock::new(RoleRegistry::new_builtin);

/// Read-only table of role templates, looked up by name.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
	templates: HashMap<String, RoleTemplate>,
}

impl RoleRegistry {
	/// The process-wide registry of built-in roles.
	pub fn builtin() -> &'static RoleRegistry {
		&BUILTIN_REGISTRY
	}

	fn new_builtin() -> Self {
		let templates = builtin_templates()
			.into_iter()
			.map(|t| (t.name.clone(), t))
			.collect();
		Self { templates }
	}

	/// Built-in roles extended with custom templates.
	///
	/// # Errors
	/// Returns `RbacError::PolicyEvaluation` if a custom template has an
	/// empty name, contains the organization separator, or shadows an
	/// existing role.
	pub fn with_custom(custom: Vec<RoleTemplate>) -> Result<Self, RbacError> {
		let mut registry = Self::new_builtin();
		for template in custom {
			if template.name.is_empty() || template.name.contains(ORG_ROLE_SEPARATOR) {
				return Err(RbacError::PolicyEvaluation(format!(
					"invalid role name '{}'",
					template.name
				)));
			}
			if registry.templates.contains_key(&template.name) {
				return Err(RbacError::PolicyEvaluation(format!(
					"role '{}' is already defined",
					template.name
				)));
			}
			registry.templates.insert(template.name.clone(), template);
		}
		Ok(registry)
	}

	/// Resolve a role name into a materialized role.
	///
	/// # Errors
	/// Returns `RbacError::UnknownRole` if the base name is not registered,
	/// if an organization role is missing its organization, or if a site
	/// role carries one.
	pub fn resolve(&self, name: &str) -> Result<Role, RbacError> {
		let unknown = || RbacError::UnknownRole {
			name: name.to_string(),
		};

		let (base, org_id) = match name.split_once(ORG_ROLE_SEPARATOR) {
			Some((base, org)) => (base, Some(org.parse::<OrgId>().map_err(|_| unknown())?)),
			None => (name, None),
		};

		let template = self.templates.get(base).ok_or_else(unknown)?;
		if template.org_scoped != org_id.is_some() {
			return Err(unknown());
		}

		Ok(template.materialize(org_id))
	}

	/// If `name` is a well-formed organization role, returns its organization.
	pub fn org_of(&self, name: &str) -> Option<OrgId> {
		self.org_role_parts(name).map(|(_, org_id)| org_id)
	}

	/// Splits a well-formed organization role into its base name and
	/// organization. The organization is parsed, so differently formatted
	/// spellings of the same id compare equal.
	pub fn org_role_parts<'a>(&self, name: &'a str) -> Option<(&'a str, OrgId)> {
		let (base, org) = name.split_once(ORG_ROLE_SEPARATOR)?;
		let template = self.templates.get(base)?;
		if !template.org_scoped {
			return None;
		}
		Some((base, org.parse().ok()?))
	}

	/// All site-wide roles, sorted by name.
	pub fn site_roles(&self) -> Vec<Role> {
		let mut roles: Vec<Role> = self
			.templates
			.values()
			.filter(|t| !t.org_scoped)
			.map(|t| t.materialize(None))
			.collect();
		roles.sort_by(|a, b| a.name.cmp(&b.name));
		roles
	}

	/// All organization roles bound to `org_id`, sorted by name.
	pub fn organization_roles(&self, org_id: OrgId) -> Vec<Role> {
		let mut roles: Vec<Role> = self
			.templates
			.values()
			.filter(|t| t.org_scoped)
			.map(|t| t.materialize(Some(org_id)))
			.collect();
		roles.sort_by(|a, b| a.name.cmp(&b.name));
		roles
	}
}

fn builtin_templates() -> Vec<RoleTemplate> {
	vec![
		RoleTemplate {
			name: ROLE_OWNER.to_string(),
			display_name: "Owner".to_string(),
			site: vec![allow_all()],
			org: Vec::new(),
			user: Vec::new(),
			org_scoped: false,
		},
		RoleTemplate {
			name: ROLE_MEMBER.to_string(),
			display_name: "Member".to_string(),
			site: vec![Permission::allow(ResourceType::USER, Action::Read)],
			org: Vec::new(),
			user: vec![allow_all()],
			org_scoped: false,
		},
		RoleTemplate {
			name: ROLE_AUDITOR.to_string(),
			display_name: "Auditor".to_string(),
			site: vec![
				Permission::allow(ResourceType::AUDIT_LOG, Action::Read),
				Permission::allow(ResourceType::USER, Action::Read),
			],
			org: Vec::new(),
			user: Vec::new(),
			org_scoped: false,
		},
		RoleTemplate {
			name: ROLE_TEMPLATE_ADMIN.to_string(),
			display_name: "Template Admin".to_string(),
			site: vec![
				Permission::allow(ResourceType::TEMPLATE, PermissionAction::All),
				Permission::allow(ResourceType::WORKSPACE, Action::Read),
				Permission::allow(ResourceType::USER, Action::Read),
			],
			org: Vec::new(),
			user: Vec::new(),
			org_scoped: false,
		},
		RoleTemplate {
			name: ROLE_USER_ADMIN.to_string(),
			display_name: "User Admin".to_string(),
			site: vec![
				Permission::allow(ResourceType::USER, PermissionAction::All),
				Permission::allow(ResourceType::ORGANIZATION_MEMBER, PermissionAction::All),
				Permission::allow(ResourceType::ROLE_ASSIGNMENT, PermissionAction::All),
			],
			org: Vec::new(),
			user: Vec::new(),
			org_scoped: false,
		},
		RoleTemplate {
			name: ROLE_ORG_ADMIN.to_string(),
			display_name: "Organization Admin".to_string(),
			site: Vec::new(),
			org: vec![allow_all()],
			user: Vec::new(),
			org_scoped: true,
		},
		RoleTemplate {
			name: ROLE_ORG_MEMBER.to_string(),
			display_name: "Organization Member".to_string(),
			site: Vec::new(),
			org: vec![
				Permission::allow(ResourceType::ORGANIZATION, Action::Read),
				Permission::allow(ResourceType::ORGANIZATION_MEMBER, Action::Read),
				Permission::allow(ResourceType::TEMPLATE, Action::Read),
			],
			user: vec![allow_all()],
			org_scoped: true,
		},
	]
}

/// Look up a built-in role by name.
///
/// # Errors
/// Returns `RbacError::UnknownRole` if `name` is not a built-in role.
pub fn role_by_name(name: &str) -> Result<Role, RbacError> {
	RoleRegistry::builtin().resolve(name)
}

/// If `name` is a built-in organization role, returns its organization.
pub fn is_org_role(name: &str) -> Option<OrgId> {
	RoleRegistry::builtin().org_of(name)
}

/// All built-in site roles.
pub fn site_roles() -> Vec<Role> {
	RoleRegistry::builtin().site_roles()
}

/// All built-in organization roles for `org_id`.
pub fn organization_roles(org_id: OrgId) -> Vec<Role> {
	RoleRegistry::builtin().organization_roles(org_id)
}

/// Returns true if a subject holding `actor_roles` may grant or revoke
/// `assigned`.
///
/// - `owner` may assign any role
/// - `user-admin` may assign every site role except `owner` and
///   `user-admin`, and membership of any organization
/// - `organization-admin:<org>` may assign admin and member of that
///   organization only
pub fn can_assign_role(actor_roles: &[String], assigned: &str) -> bool {
	let registry = RoleRegistry::builtin();
	let assigned_org = registry.org_role_parts(assigned);

	actor_roles.iter().any(|actor_role| {
		if actor_role == ROLE_OWNER {
			return true;
		}

		if actor_role == ROLE_USER_ADMIN {
			return match assigned_org {
				Some((base, _)) => base == ROLE_ORG_MEMBER,
				None => matches!(
					assigned,
					ROLE_MEMBER | ROLE_AUDITOR | ROLE_TEMPLATE_ADMIN
				),
			};
		}

		match (registry.org_role_parts(actor_role), assigned_org) {
			(Some((ROLE_ORG_ADMIN, actor_org)), Some((base, target_org))) => {
				actor_org == target_org && (base == ROLE_ORG_ADMIN || base == ROLE_ORG_MEMBER)
			}
			_ => false,
		}
	})
}

// =============================================================================
// Expandable roles
// =============================================================================

/// Anything that resolves to a concrete set of roles.
pub trait ExpandableRoles {
	/// Resolve into materialized roles using `registry` for named roles.
	///
	/// # Errors
	/// Returns `RbacError::UnknownRole` if a name cannot be resolved.
	fn expand(&self, registry: &RoleRegistry) -> Result<Vec<Role>, RbacError>;

	/// The role names, for logging and role-assignment checks.
	fn names(&self) -> Vec<String>;
}

/// Roles referenced by name, resolved through a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleNames(pub Vec<String>);

impl RoleNames {
	pub fn new<I, S>(names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self(names.into_iter().map(Into::into).collect())
	}
}

impl ExpandableRoles for RoleNames {
	fn expand(&self, registry: &RoleRegistry) -> Result<Vec<Role>, RbacError> {
		self.0.iter().map(|name| registry.resolve(name)).collect()
	}

	fn names(&self) -> Vec<String> {
		self.0.clone()
	}
}

impl ExpandableRoles for Vec<Role> {
	fn expand(&self, _registry: &RoleRegistry) -> Result<Vec<Role>, RbacError> {
		Ok(self.clone())
	}

	fn names(&self) -> Vec<String> {
		self.iter().map(|r| r.name.clone()).collect()
	}
}

/// The roles carried by a subject: either names or already-materialized roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSet {
	Names(RoleNames),
	Materialized(Vec<Role>),
}

impl From<RoleNames> for RoleSet {
	fn from(names: RoleNames) -> Self {
		RoleSet::Names(names)
	}
}

impl From<Vec<Role>> for RoleSet {
	fn from(roles: Vec<Role>) -> Self {
		RoleSet::Materialized(roles)
	}
}

impl ExpandableRoles for RoleSet {
	fn expand(&self, registry: &RoleRegistry) -> Result<Vec<Role>, RbacError> {
		match self {
			RoleSet::Names(names) => names.expand(registry),
			RoleSet::Materialized(roles) => roles.expand(registry),
		}
	}

	fn names(&self) -> Vec<String> {
		match self {
			RoleSet::Names(names) => names.names(),
			RoleSet::Materialized(roles) => roles.names(),
		}
	}
}
