// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::role::{ExpandableRoles, RoleNames, RoleSet};
use crate::scope::ScopeName;
use crate::types::{GroupId, UserId};

/// The actor on whose behalf an operation runs.
///
/// Immutable once constructed. A subject always has a group set (possibly
/// empty) and a scope (`all` unless narrowed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
	id: UserId,
	roles: RoleSet,
	#[serde(default)]
	groups: Vec<GroupId>,
	#[serde(default)]
	scope: ScopeName,
}

impl Subject {
	pub fn new(id: UserId, roles: impl Into<RoleSet>) -> Self {
		Self {
			id,
			roles: roles.into(),
			groups: Vec::new(),
			scope: ScopeName::all(),
		}
	}

	/// Subject whose roles are resolved by name through the role registry.
	pub fn with_role_names<I, S>(id: UserId, names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::new(id, RoleNames::new(names))
	}

	pub fn with_groups(mut self, groups: Vec<GroupId>) -> Self {
		self.groups = groups;
		self
	}

	pub fn with_scope(mut self, scope: ScopeName) -> Self {
		self.scope = scope;
		self
	}

	pub fn id(&self) -> UserId {
		self.id
	}

	pub fn roles(&self) -> &RoleSet {
		&self.roles
	}

	pub fn role_names(&self) -> Vec<String> {
		self.roles.names()
	}

	pub fn groups(&self) -> &[GroupId] {
		&self.groups
	}

	pub fn scope(&self) -> &ScopeName {
		&self.scope
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::role::Role;

	#[test]
	fn defaults_to_scope_all_and_no_groups() {
		let subject = Subject::with_role_names(UserId::generate(), ["member"]);
		assert_eq!(subject.scope(), &ScopeName::all());
		assert!(subject.groups().is_empty());
		assert_eq!(subject.role_names(), vec!["member".to_string()]);
	}

	#[test]
	fn builder_narrows_scope_and_adds_groups() {
		let group = GroupId::generate();
		let subject = Subject::new(UserId::generate(), vec![Role::new("custom")])
			.with_groups(vec![group])
			.with_scope(ScopeName::read_only());
		assert_eq!(subject.groups(), &[group]);
		assert_eq!(subject.scope().as_str(), "read_only");
	}
}
