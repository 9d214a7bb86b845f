// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scopes narrow what a subject's roles grant.
//!
//! A scope never widens access: a decision is allowed only if the roles
//! allow it and the scope allows it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::role::Permission;
use crate::types::{Action, Effect, ResourceType};

pub const SCOPE_ALL: &str = "all";
pub const SCOPE_APPLICATION_CONNECT: &str = "application_connect";
pub const SCOPE_READ_ONLY: &str = "read_only";

/// Name of a scope declared in the policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeName(String);

impl ScopeName {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	/// The unrestricted scope.
	pub fn all() -> Self {
		Self(SCOPE_ALL.to_string())
	}

	pub fn application_connect() -> Self {
		Self(SCOPE_APPLICATION_CONNECT.to_string())
	}

	pub fn read_only() -> Self {
		Self(SCOPE_READ_ONLY.to_string())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl Default for ScopeName {
	fn default() -> Self {
		Self::all()
	}
}

impl fmt::Display for ScopeName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ScopeName {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

/// A named permission set intersected with role permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
	pub name: ScopeName,
	#[serde(default)]
	pub display_name: String,
	#[serde(default)]
	pub permissions: Vec<Permission>,
}

impl Scope {
	/// Returns true if the scope permits `action` on `resource_type`.
	///
	/// A matching deny wins over any matching allow; no match is a deny.
	pub fn allows(&self, resource_type: &ResourceType, action: Action) -> bool {
		let mut allowed = false;
		for permission in self
			.permissions
			.iter()
			.filter(|p| p.matches(resource_type, action))
		{
			match permission.effect {
				Effect::Deny => return false,
				Effect::Allow => allowed = true,
			}
		}
		allowed
	}
}
