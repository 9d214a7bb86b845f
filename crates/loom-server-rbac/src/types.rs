// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for authorization.
//!
//! - **ID newtypes**: Type-safe wrappers around UUIDs ([`UserId`], [`OrgId`],
//!   [`GroupId`]) so that owners, organizations and groups are never mixed up
//! - **Actions**: The verbs a subject can perform ([`Action`]), plus the
//!   wildcard-capable form used inside permissions ([`PermissionAction`])
//! - **Resource types**: String-backed identifiers for the kinds of object
//!   being protected ([`ResourceType`])
//! - **Effects**: Whether a permission grants or revokes access ([`Effect`])

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The wildcard symbol accepted for resource types and actions.
pub const WILDCARD_SYMBOL: &str = "*";

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			/// Get the inner UUID value.
			pub fn into_inner(self) -> Uuid {
				self.0
			}

			/// Get a reference to the inner UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Uuid::parse_str(s).map(Self)
			}
		}
	};
}

define_id_type!(UserId, "Unique identifier for a user (the subject of a decision).");
define_id_type!(OrgId, "Unique identifier for an organization.");
define_id_type!(GroupId, "Unique identifier for a group of users.");

// =============================================================================
// Actions
// =============================================================================

/// A verb performed on a protected object, independent of its resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	Create,
	Read,
	Update,
	Delete,
}

impl Action {
	/// Returns all available actions.
	pub fn all() -> &'static [Action] {
		&[Action::Create, Action::Read, Action::Update, Action::Delete]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Action::Create => "create",
			Action::Read => "read",
			Action::Update => "update",
			Action::Delete => "delete",
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error returned when an action string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
	type Err = UnknownAction;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"create" => Ok(Action::Create),
			"read" => Ok(Action::Read),
			"update" => Ok(Action::Update),
			"delete" => Ok(Action::Delete),
			other => Err(UnknownAction(other.to_string())),
		}
	}
}

/// The action half of a permission: either one concrete action or `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PermissionAction {
	All,
	Only(Action),
}

impl PermissionAction {
	/// Returns true if this permission action applies to `action`.
	pub fn covers(&self, action: Action) -> bool {
		match self {
			PermissionAction::All => true,
			PermissionAction::Only(a) => *a == action,
		}
	}
}

impl From<Action> for PermissionAction {
	fn from(action: Action) -> Self {
		PermissionAction::Only(action)
	}
}

impl fmt::Display for PermissionAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PermissionAction::All => f.write_str(WILDCARD_SYMBOL),
			PermissionAction::Only(a) => write!(f, "{a}"),
		}
	}
}

impl FromStr for PermissionAction {
	type Err = UnknownAction;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s == WILDCARD_SYMBOL {
			return Ok(PermissionAction::All);
		}
		s.parse().map(PermissionAction::Only)
	}
}

impl TryFrom<String> for PermissionAction {
	type Error = UnknownAction;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<PermissionAction> for String {
	fn from(value: PermissionAction) -> Self {
		value.to_string()
	}
}

// =============================================================================
// Resource Types
// =============================================================================

/// The kind of object being protected.
///
/// Resource types are plain strings so that domain crates can introduce new
/// kinds without touching this crate; the well-known ones are associated
/// constants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(Cow<'static, str>);

impl ResourceType {
	/// Matches every resource type when used inside a permission.
	pub const WILDCARD: ResourceType = ResourceType::from_static(WILDCARD_SYMBOL);
	pub const WORKSPACE: ResourceType = ResourceType::from_static("workspace");
	/// Connecting to applications running inside a workspace.
	pub const WORKSPACE_APPLICATION_CONNECT: ResourceType =
		ResourceType::from_static("application_connect");
	pub const TEMPLATE: ResourceType = ResourceType::from_static("template");
	pub const USER: ResourceType = ResourceType::from_static("user");
	pub const ORGANIZATION: ResourceType = ResourceType::from_static("organization");
	pub const ORGANIZATION_MEMBER: ResourceType = ResourceType::from_static("organization_member");
	pub const ROLE_ASSIGNMENT: ResourceType = ResourceType::from_static("role_assignment");
	pub const AUDIT_LOG: ResourceType = ResourceType::from_static("audit_log");

	pub const fn from_static(name: &'static str) -> Self {
		Self(Cow::Borrowed(name))
	}

	pub fn new(name: impl Into<String>) -> Self {
		Self(Cow::Owned(name.into()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_wildcard(&self) -> bool {
		self.0 == WILDCARD_SYMBOL
	}

	/// Returns true if this (permission-side) type applies to `object_type`.
	pub fn covers(&self, object_type: &ResourceType) -> bool {
		self.is_wildcard() || self == object_type
	}
}

impl fmt::Display for ResourceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

// =============================================================================
// Effects and Levels
// =============================================================================

/// Whether a matching permission grants or revokes access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
	#[default]
	Allow,
	Deny,
}

impl fmt::Display for Effect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Effect::Allow => write!(f, "allow"),
			Effect::Deny => write!(f, "deny"),
		}
	}
}

/// The level a permission applies at. Ordered from least to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
	Site,
	Org,
	User,
}

impl fmt::Display for Level {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Level::Site => write!(f, "site"),
			Level::Org => write!(f, "org"),
			Level::User => write!(f, "user"),
		}
	}
}
