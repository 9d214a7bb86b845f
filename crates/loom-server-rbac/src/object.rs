// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The minimal shape of a protected object.
//!
//! The evaluator never sees domain types directly. Every domain type that
//! needs protecting implements [`Objecter`] and projects itself into an
//! [`Object`]: its resource type, who owns it, which organization it belongs
//! to, and any per-user or per-group grants.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::types::{Action, GroupId, OrgId, PermissionAction, ResourceType, UserId};

/// The authorization view of a protected resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
	#[serde(rename = "type")]
	pub resource_type: ResourceType,
	/// Identifier of the concrete resource; informational, used for audit.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resource_id: Option<Uuid>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub owner: Option<UserId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub org_owner: Option<OrgId>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub acl_user_list: BTreeMap<UserId, Vec<PermissionAction>>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub acl_group_list: BTreeMap<GroupId, Vec<PermissionAction>>,
}

impl Object {
	/// Creates an object of the given type with no owner, organization or ACL.
	pub fn new(resource_type: ResourceType) -> Self {
		Self {
			resource_type,
			resource_id: None,
			owner: None,
			org_owner: None,
			acl_user_list: BTreeMap::new(),
			acl_group_list: BTreeMap::new(),
		}
	}

	/// Builder: set the concrete resource id.
	pub fn with_id(mut self, id: impl Into<Uuid>) -> Self {
		self.resource_id = Some(id.into());
		self
	}

	/// Builder: set the owning user.
	pub fn with_owner(mut self, owner: UserId) -> Self {
		self.owner = Some(owner);
		self
	}

	/// Builder: set the owning organization.
	pub fn in_org(mut self, org_id: OrgId) -> Self {
		self.org_owner = Some(org_id);
		self
	}

	/// Builder: replace the per-user ACL.
	pub fn with_acl_user_list(mut self, acl: BTreeMap<UserId, Vec<PermissionAction>>) -> Self {
		self.acl_user_list = acl;
		self
	}

	/// Builder: replace the per-group ACL.
	pub fn with_acl_group_list(mut self, acl: BTreeMap<GroupId, Vec<PermissionAction>>) -> Self {
		self.acl_group_list = acl;
		self
	}

	/// Returns true if the ACL grants `action` to `user_id` directly.
	pub fn acl_grants_user(&self, user_id: &UserId, action: Action) -> bool {
		self
			.acl_user_list
			.get(user_id)
			.is_some_and(|actions| actions.iter().any(|a| a.covers(action)))
	}

	/// Returns true if the ACL grants `action` to any of `groups`.
	pub fn acl_grants_any_group(&self, groups: &[GroupId], action: Action) -> bool {
		groups.iter().any(|group| {
			self
				.acl_group_list
				.get(group)
				.is_some_and(|actions| actions.iter().any(|a| a.covers(action)))
		})
	}
}

/// Implemented by every domain type the authorization core protects.
pub trait Objecter {
	fn rbac_object(&self) -> Object;
}

impl Objecter for Object {
	fn rbac_object(&self) -> Object {
		self.clone()
	}
}

impl<T: Objecter + ?Sized> Objecter for &T {
	fn rbac_object(&self) -> Object {
		(**self).rbac_object()
	}
}
