// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collection filtering.
//!
//! All filters are order preserving and return a fresh vector; the input
//! slice is never modified.

use tracing::instrument;

use crate::authorizer::Authorizer;
use crate::error::RbacError;
use crate::object::Objecter;
use crate::predicate::Predicate;
use crate::subject::Subject;
use crate::types::{Action, UserId};

/// Keep only the objects `subject` may perform `action` on.
///
/// A `Forbidden` decision drops the element. Any other error aborts the
/// filter and is returned.
#[instrument(level = "trace", skip(authorizer, subject, objects), fields(subject_id = %subject.id(), count = objects.len()))]
pub fn filter<A, O>(
	authorizer: &A,
	subject: &Subject,
	action: Action,
	objects: &[O],
) -> Result<Vec<O>, RbacError>
where
	A: Authorizer + ?Sized,
	O: Objecter + Clone,
{
	let mut kept = Vec::with_capacity(objects.len());
	for object in objects {
		match authorizer.authorize(subject, action, &object.rbac_object()) {
			Ok(()) => kept.push(object.clone()),
			Err(RbacError::Forbidden(_)) => {}
			Err(err) => return Err(err),
		}
	}
	Ok(kept)
}

/// [`filter`] for a subject given by id and role names, with scope `all`.
pub fn filter_by_role_name<A, O>(
	authorizer: &A,
	subject_id: UserId,
	role_names: &[String],
	action: Action,
	objects: &[O],
) -> Result<Vec<O>, RbacError>
where
	A: Authorizer + ?Sized,
	O: Objecter + Clone,
{
	let subject = Subject::with_role_names(subject_id, role_names.iter().cloned());
	filter(authorizer, &subject, action, objects)
}

/// Keep only the objects matching a predicate from partial evaluation.
pub fn filter_with_predicate<O>(predicate: &Predicate, objects: &[O]) -> Vec<O>
where
	O: Objecter + Clone,
{
	if predicate.is_false() {
		return Vec::new();
	}
	objects
		.iter()
		.filter(|o| predicate.matches(&o.rbac_object()))
		.cloned()
		.collect()
}
