// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use loom_server_rbac::RbacError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Operation canceled")]
	Canceled,

	#[error(transparent)]
	Authorization(#[from] RbacError),
}

impl DbError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, DbError::NotFound(_))
	}

	pub fn is_forbidden(&self) -> bool {
		matches!(self, DbError::Authorization(err) if err.is_forbidden())
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
