// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The declarative policy artifact.
//!
//! A policy declares the scopes subjects may carry and, optionally, custom
//! roles on top of the built-in ones. It is parsed and validated once,
//! before the first decision; a policy that fails validation never reaches
//! the evaluator.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::error::RbacError;
use crate::role::{RoleRegistry, RoleTemplate};
use crate::scope::{Scope, ScopeName, SCOPE_ALL};

const BUNDLED_POLICY: &str = include_str!("../policy.toml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
	#[serde(default)]
	scopes: Vec<Scope>,
	#[serde(default)]
	roles: Vec<RoleTemplate>,
}

/// A validated policy: scopes by name and the role registry.
#[derive(Debug, Clone)]
pub struct Policy {
	scopes: BTreeMap<ScopeName, Scope>,
	registry: RoleRegistry,
}

impl Policy {
	/// The policy compiled into the binary.
	///
	/// # Errors
	/// Only fails if the bundled artifact itself is invalid.
	pub fn bundled() -> Result<Self, RbacError> {
		Self::from_toml_str(BUNDLED_POLICY)
	}

	/// Parse and validate a policy from TOML.
	///
	/// # Errors
	/// Returns `RbacError::PolicyEvaluation` describing the first problem found.
	pub fn from_toml_str(source: &str) -> Result<Self, RbacError> {
		let document: PolicyDocument = toml::from_str(source)
			.map_err(|e| RbacError::PolicyEvaluation(format!("invalid policy: {e}")))?;
		Self::from_parts(document.scopes, document.roles)
	}

	/// Read, parse and validate a policy file.
	///
	/// # Errors
	/// Returns `RbacError::PolicyRead` if the file cannot be read and
	/// `RbacError::PolicyEvaluation` if it is invalid.
	pub fn load(path: &Path) -> Result<Self, RbacError> {
		debug!(path = %path.display(), "loading policy file");
		let content = std::fs::read_to_string(path).map_err(|source| RbacError::PolicyRead {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&content)
	}

	/// Build a policy from already-parsed scopes and custom roles.
	///
	/// # Errors
	/// Returns `RbacError::PolicyEvaluation` if validation fails.
	pub fn from_parts(scopes: Vec<Scope>, roles: Vec<RoleTemplate>) -> Result<Self, RbacError> {
		let mut by_name = BTreeMap::new();
		for scope in scopes {
			if scope.name.as_str().is_empty() {
				return Err(RbacError::PolicyEvaluation(
					"scope name must not be empty".to_string(),
				));
			}
			if scope
				.permissions
				.iter()
				.any(|p| p.resource_type.as_str().is_empty())
			{
				return Err(RbacError::PolicyEvaluation(format!(
					"scope '{}' has a permission with an empty resource type",
					scope.name
				)));
			}
			if by_name.contains_key(&scope.name) {
				return Err(RbacError::PolicyEvaluation(format!(
					"scope '{}' is declared more than once",
					scope.name
				)));
			}
			by_name.insert(scope.name.clone(), scope);
		}

		if !by_name.contains_key(&ScopeName::all()) {
			return Err(RbacError::PolicyEvaluation(format!(
				"policy must declare the '{SCOPE_ALL}' scope"
			)));
		}

		let mut role_names = HashSet::new();
		for role in &roles {
			if !role_names.insert(role.name.as_str()) {
				return Err(RbacError::PolicyEvaluation(format!(
					"role '{}' is declared more than once",
					role.name
				)));
			}
		}

		let custom_roles = roles.len();
		let registry = RoleRegistry::with_custom(roles)?;

		info!(
			scopes = by_name.len(),
			custom_roles, "prepared authorization policy"
		);

		Ok(Self {
			scopes: by_name,
			registry,
		})
	}

	pub fn scope(&self, name: &ScopeName) -> Option<&Scope> {
		self.scopes.get(name)
	}

	pub fn scope_names(&self) -> impl Iterator<Item = &ScopeName> {
		self.scopes.keys()
	}

	pub fn registry(&self) -> &RoleRegistry {
		&self.registry
	}
}
