// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! An authorizer that allows everything and records what it was asked.
//!
//! Used in tests to prove that an operation consulted the authorizer with
//! exactly the expected (action, object) pairs.
//!
//! ```ignore
//! let recorder = RecordingAuthorizer::new();
//! // ... run operations through a store wrapped with `recorder` ...
//! recorder.assert_actor(subject.id(), &[pair(Action::Read, &workspace)]);
//! recorder.all_asserted()?;
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::authorizer::Authorizer;
use crate::error::RbacError;
use crate::object::{Object, Objecter};
use crate::predicate::Predicate;
use crate::subject::Subject;
use crate::types::{Action, ResourceType, UserId};

/// An expected decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionObjectPair {
	pub action: Action,
	pub object: Object,
}

pub fn pair(action: Action, object: impl Objecter) -> ActionObjectPair {
	ActionObjectPair {
		action,
		object: object.rbac_object(),
	}
}

/// One recorded decision. Partial evaluations record an object carrying
/// only the resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDecision {
	pub subject_id: UserId,
	pub action: Action,
	pub object: Object,
	pub partial: bool,
	asserted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
	#[error("{} authorization decision(s) were never asserted: {}", .0.len(), .0.join("; "))]
	Unasserted(Vec<String>),
}

#[derive(Debug, Default)]
pub struct RecordingAuthorizer {
	calls: Mutex<Vec<RecordedDecision>>,
}

impl RecordingAuthorizer {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, Vec<RecordedDecision>> {
		self.calls.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn record(&self, subject: &Subject, action: Action, object: Object, partial: bool) {
		self.lock().push(RecordedDecision {
			subject_id: subject.id(),
			action,
			object,
			partial,
			asserted: false,
		});
	}

	/// Snapshot of every decision recorded so far.
	pub fn recorded(&self) -> Vec<RecordedDecision> {
		self.lock().clone()
	}

	/// Assert that the not-yet-asserted decisions for `subject_id` are exactly
	/// `expected`, in any order, and mark them asserted.
	///
	/// # Panics
	/// Panics if a pair is missing or if extra decisions were recorded.
	pub fn assert_actor(&self, subject_id: UserId, expected: &[ActionObjectPair]) {
		let failure = {
			let mut calls = self.lock();
			let pending: Vec<usize> = calls
				.iter()
				.enumerate()
				.filter(|(_, c)| !c.asserted && c.subject_id == subject_id)
				.map(|(i, _)| i)
				.collect();

			let mut unmatched = pending.clone();
			let mut missing = Vec::new();
			for want in expected {
				let found = unmatched.iter().position(|&i| {
					calls[i].action == want.action && calls[i].object == want.object
				});
				match found {
					Some(pos) => {
						unmatched.remove(pos);
					}
					None => missing.push(format!("{} {}", want.action, want.object.resource_type)),
				}
			}

			if missing.is_empty() && unmatched.is_empty() {
				for i in pending {
					calls[i].asserted = true;
				}
				None
			} else {
				let extra: Vec<String> = unmatched
					.iter()
					.map(|&i| describe(&calls[i]))
					.collect();
				Some(format!(
					"authorization decisions for subject {subject_id} did not match: missing [{}], unexpected [{}]",
					missing.join(", "),
					extra.join(", ")
				))
			}
		};

		if let Some(message) = failure {
			panic!("{message}");
		}
	}

	/// Fails if any recorded decision has not been asserted.
	pub fn all_asserted(&self) -> Result<(), RecorderError> {
		let unasserted: Vec<String> = self
			.lock()
			.iter()
			.filter(|c| !c.asserted)
			.map(describe)
			.collect();
		if unasserted.is_empty() {
			Ok(())
		} else {
			Err(RecorderError::Unasserted(unasserted))
		}
	}

	/// Forget every recorded decision.
	pub fn reset(&self) {
		self.lock().clear();
	}
}

fn describe(call: &RecordedDecision) -> String {
	format!(
		"{} {} {}{}",
		call.subject_id,
		call.action,
		call.object.resource_type,
		if call.partial { " (partial)" } else { "" }
	)
}

impl Authorizer for RecordingAuthorizer {
	fn authorize(&self, subject: &Subject, action: Action, object: &Object) -> Result<(), RbacError> {
		self.record(subject, action, object.clone(), false);
		Ok(())
	}

	fn partial(
		&self,
		subject: &Subject,
		action: Action,
		resource_type: &ResourceType,
	) -> Result<Predicate, RbacError> {
		self.record(subject, action, Object::new(resource_type.clone()), true);
		Ok(Predicate::TRUE)
	}
}
