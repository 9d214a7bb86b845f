// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::path::PathBuf;

use crate::object::Object;
use crate::types::{Action, UserId};

/// A denied decision.
///
/// Displays only "forbidden" so the reason never reaches a client by
/// accident. The internal cause and the full input are available for
/// server-side logging through [`ForbiddenError::internal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForbiddenError {
	pub subject_id: UserId,
	pub roles: Vec<String>,
	pub scope: String,
	pub action: Action,
	pub object: Object,
	reason: String,
}

impl ForbiddenError {
	pub fn new(
		subject_id: UserId,
		roles: Vec<String>,
		scope: impl Into<String>,
		action: Action,
		object: Object,
		reason: impl Into<String>,
	) -> Self {
		Self {
			subject_id,
			roles,
			scope: scope.into(),
			action,
			object,
			reason: reason.into(),
		}
	}

	/// The internal cause of the denial. Never send this to a client.
	pub fn internal(&self) -> &str {
		&self.reason
	}
}

impl fmt::Display for ForbiddenError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("forbidden")
	}
}

impl std::error::Error for ForbiddenError {}

#[derive(Debug, thiserror::Error)]
pub enum RbacError {
	#[error("{0}")]
	Forbidden(Box<ForbiddenError>),

	#[error("unknown role '{name}'")]
	UnknownRole { name: String },

	#[error("no authorization context")]
	NoAuthorizationContext,

	#[error("policy evaluation failed: {0}")]
	PolicyEvaluation(String),

	#[error("failed to read policy {path}: {source}")]
	PolicyRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl RbacError {
	pub fn forbidden(error: ForbiddenError) -> Self {
		RbacError::Forbidden(Box::new(error))
	}

	pub fn is_forbidden(&self) -> bool {
		matches!(self, RbacError::Forbidden(_))
	}

	/// The message safe to show to an end user.
	pub fn public_message(&self) -> &'static str {
		match self {
			RbacError::Forbidden(_) => "forbidden",
			_ => "internal server error",
		}
	}
}
