// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-operation request context.
//!
//! Every store operation takes a [`RequestContext`] as its first argument.
//! It carries the [`Subject`] the operation runs as and a
//! [`CancellationToken`] that aborts in-flight work.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::RbacError;
use crate::subject::Subject;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
	subject: Option<Arc<Subject>>,
	cancel: CancellationToken,
}

impl RequestContext {
	/// A context with no subject. Authorized operations fail on it.
	pub fn anonymous() -> Self {
		Self::default()
	}

	pub fn with_subject(subject: Subject) -> Self {
		Self {
			subject: Some(Arc::new(subject)),
			cancel: CancellationToken::new(),
		}
	}

	/// Derive a context acting as `subject`, sharing this context's cancellation.
	pub fn as_subject(&self, subject: Subject) -> Self {
		Self {
			subject: Some(Arc::new(subject)),
			cancel: self.cancel.clone(),
		}
	}

	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn subject(&self) -> Option<&Subject> {
		self.subject.as_deref()
	}

	/// The subject, or `NoAuthorizationContext` if none is attached.
	pub fn require_subject(&self) -> Result<&Subject, RbacError> {
		match self.subject.as_deref() {
			Some(subject) => Ok(subject),
			None => {
				tracing::error!("authorized operation attempted without a subject in context");
				Err(RbacError::NoAuthorizationContext)
			}
		}
	}

	pub fn cancellation_token(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
	}
}
