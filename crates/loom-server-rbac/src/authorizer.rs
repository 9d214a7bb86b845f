// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy evaluation.
//!
//! [`RbacAuthorizer`] implements two evaluation modes over the same
//! permission set:
//!
//! - **Full** ([`Authorizer::authorize`]): decide one (subject, action,
//!   object) triple.
//! - **Partial** ([`Authorizer::partial`]): decide everything that does not
//!   depend on the object and return a [`Predicate`] over what does.
//!
//! Full evaluation collects every matching permission across every role and
//! level before reaching a verdict:
//!
//! 1. site permissions always apply;
//! 2. org permissions apply when the object is owned by that organization;
//! 3. user permissions apply when the object is owned by the subject, and
//!    ACL grants to the subject or its groups count as user-level allows;
//! 4. any matching deny wins; otherwise any matching allow grants access,
//!    reported at the most specific level; no match is an implicit deny;
//! 5. the subject's scope must also allow the action.

use std::sync::Arc;
use tracing::{debug, instrument, trace};

use crate::config::RbacConfig;
use crate::error::{ForbiddenError, RbacError};
use crate::object::Object;
use crate::policy::Policy;
use crate::predicate::Predicate;
use crate::role::{ExpandableRoles, Permission, Role};
use crate::scope::Scope;
use crate::subject::Subject;
use crate::types::{Action, Effect, Level, OrgId, ResourceType, UserId};

/// Decides whether subjects may act on objects.
///
/// Implementations are pure and CPU-only, so the trait is synchronous.
pub trait Authorizer: Send + Sync {
	/// Full evaluation of one decision.
	///
	/// # Errors
	/// `RbacError::Forbidden` on deny. Any other error means the decision
	/// could not be made and must be escalated, never treated as a deny.
	fn authorize(&self, subject: &Subject, action: Action, object: &Object) -> Result<(), RbacError>;

	/// Partial evaluation for a resource type, yielding a residual predicate.
	fn partial(
		&self,
		subject: &Subject,
		action: Action,
		resource_type: &ResourceType,
	) -> Result<Predicate, RbacError>;

	/// Authorize a subject given only its id and role names, with scope `all`.
	fn by_role_name(
		&self,
		subject_id: UserId,
		role_names: &[String],
		action: Action,
		object: &Object,
	) -> Result<(), RbacError> {
		let subject = Subject::with_role_names(subject_id, role_names.iter().cloned());
		self.authorize(&subject, action, object)
	}
}

impl<T: Authorizer + ?Sized> Authorizer for Arc<T> {
	fn authorize(&self, subject: &Subject, action: Action, object: &Object) -> Result<(), RbacError> {
		(**self).authorize(subject, action, object)
	}

	fn partial(
		&self,
		subject: &Subject,
		action: Action,
		resource_type: &ResourceType,
	) -> Result<Predicate, RbacError> {
		(**self).partial(subject, action, resource_type)
	}
}

/// The diagnostic outcome of a full evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
	pub allowed: bool,
	/// Most specific allowing level on allow; level of the deny on an
	/// explicit deny; `None` for an implicit or scope deny.
	pub level: Option<Level>,
	pub reason: String,
}

impl Decision {
	fn allow(level: Level) -> Self {
		Self {
			allowed: true,
			level: Some(level),
			reason: format!("allowed at {level} level"),
		}
	}

	fn deny(level: Option<Level>, reason: String) -> Self {
		Self {
			allowed: false,
			level,
			reason,
		}
	}
}

/// The role-based authorizer backed by a validated [`Policy`].
#[derive(Debug, Clone)]
pub struct RbacAuthorizer {
	policy: Arc<Policy>,
	log_allowed_decisions: bool,
}

impl RbacAuthorizer {
	/// An authorizer using the bundled policy.
	///
	/// # Errors
	/// Fails only if the bundled policy is invalid; callers treat this as
	/// fatal at startup.
	pub fn new() -> Result<Self, RbacError> {
		Ok(Self::from_policy(Policy::bundled()?))
	}

	pub fn from_policy(policy: Policy) -> Self {
		Self {
			policy: Arc::new(policy),
			log_allowed_decisions: false,
		}
	}

	/// Load the configured policy file, or the bundled policy if none is set.
	pub fn from_config(config: &RbacConfig) -> Result<Self, RbacError> {
		let policy = match &config.policy_path {
			Some(path) => Policy::load(path)?,
			None => Policy::bundled()?,
		};
		Ok(Self::from_policy(policy).with_log_allowed_decisions(config.log_allowed_decisions))
	}

	pub fn with_log_allowed_decisions(mut self, enabled: bool) -> Self {
		self.log_allowed_decisions = enabled;
		self
	}

	pub fn policy(&self) -> &Policy {
		&self.policy
	}

	/// Authorize with custom, already-materialized roles (scope `all`, no groups).
	pub fn authorize_roles(
		&self,
		subject_id: UserId,
		roles: Vec<Role>,
		action: Action,
		object: &Object,
	) -> Result<(), RbacError> {
		self.authorize(&Subject::new(subject_id, roles), action, object)
	}

	/// Partial evaluation for a subject given by id and role names.
	pub fn partial_by_role_name(
		&self,
		subject_id: UserId,
		role_names: &[String],
		action: Action,
		resource_type: &ResourceType,
	) -> Result<Predicate, RbacError> {
		let subject = Subject::with_role_names(subject_id, role_names.iter().cloned());
		self.partial(&subject, action, resource_type)
	}

	/// Full evaluation, returning the diagnostic decision instead of an error.
	///
	/// # Errors
	/// Returns `RbacError::UnknownRole` for an unresolvable role and
	/// `RbacError::PolicyEvaluation` for a scope the policy does not declare.
	pub fn evaluate(
		&self,
		subject: &Subject,
		action: Action,
		object: &Object,
	) -> Result<Decision, RbacError> {
		let roles = subject.roles().expand(self.policy.registry())?;
		let scope = self.scope_for(subject)?;
		let resource_type = &object.resource_type;

		let mut allow: Option<Level> = None;
		let mut deny: Option<Level> = None;
		let mut record = |level: Level, permissions: &[Permission]| {
			for permission in permissions
				.iter()
				.filter(|p| p.matches(resource_type, action))
			{
				let slot = match permission.effect {
					Effect::Allow => &mut allow,
					Effect::Deny => &mut deny,
				};
				*slot = (*slot).max(Some(level));
			}
		};

		let owned_by_subject = object.owner == Some(subject.id());
		for role in &roles {
			record(Level::Site, &role.site);
			if let Some(org_id) = &object.org_owner {
				if let Some(permissions) = role.org.get(org_id) {
					record(Level::Org, permissions);
				}
			}
			if owned_by_subject {
				record(Level::User, &role.user);
			}
		}

		if object.acl_grants_user(&subject.id(), action)
			|| object.acl_grants_any_group(subject.groups(), action)
		{
			allow = allow.max(Some(Level::User));
		}

		let decision = match (deny, allow) {
			(Some(level), _) => Decision::deny(
				Some(level),
				format!("{action} on {resource_type} denied at {level} level"),
			),
			(None, None) => Decision::deny(
				None,
				format!("no permission grants {action} on {resource_type}"),
			),
			(None, Some(level)) => {
				if scope.allows(resource_type, action) {
					Decision::allow(level)
				} else {
					Decision::deny(
						None,
						format!(
							"scope '{}' does not permit {action} on {resource_type}",
							scope.name
						),
					)
				}
			}
		};

		Ok(decision)
	}

	fn scope_for(&self, subject: &Subject) -> Result<&Scope, RbacError> {
		self.policy.scope(subject.scope()).ok_or_else(|| {
			RbacError::PolicyEvaluation(format!("unknown scope '{}'", subject.scope()))
		})
	}
}

impl Authorizer for RbacAuthorizer {
	#[instrument(
		level = "trace",
		skip(self, subject, object),
		fields(
			subject_id = %subject.id(),
			action = %action,
			resource_type = %object.resource_type,
		)
	)]
	fn authorize(&self, subject: &Subject, action: Action, object: &Object) -> Result<(), RbacError> {
		let decision = self.evaluate(subject, action, object)?;

		if decision.allowed {
			if self.log_allowed_decisions {
				debug!(level = ?decision.level, "authorization allowed");
			} else {
				trace!(level = ?decision.level, "authorization allowed");
			}
			return Ok(());
		}

		debug!(
			reason = %decision.reason,
			roles = ?subject.role_names(),
			scope = %subject.scope(),
			"authorization denied"
		);
		Err(RbacError::forbidden(ForbiddenError::new(
			subject.id(),
			subject.role_names(),
			subject.scope().to_string(),
			action,
			object.clone(),
			decision.reason,
		)))
	}

	#[instrument(
		level = "trace",
		skip(self, subject),
		fields(
			subject_id = %subject.id(),
			action = %action,
			resource_type = %resource_type,
		)
	)]
	fn partial(
		&self,
		subject: &Subject,
		action: Action,
		resource_type: &ResourceType,
	) -> Result<Predicate, RbacError> {
		let roles = subject.roles().expand(self.policy.registry())?;
		let scope = self.scope_for(subject)?;

		if !scope.allows(resource_type, action) {
			trace!(scope = %scope.name, "scope excludes action");
			return Ok(Predicate::FALSE);
		}

		let mut allow = Conditions::default();
		let mut deny = Conditions::default();
		for role in &roles {
			for permission in role.site.iter().filter(|p| p.matches(resource_type, action)) {
				conditions_for(permission.effect, &mut allow, &mut deny).site = true;
			}
			for (org_id, permissions) in &role.org {
				for permission in permissions.iter().filter(|p| p.matches(resource_type, action)) {
					conditions_for(permission.effect, &mut allow, &mut deny)
						.orgs
						.push(*org_id);
				}
			}
			for permission in role.user.iter().filter(|p| p.matches(resource_type, action)) {
				conditions_for(permission.effect, &mut allow, &mut deny).owner = true;
			}
		}

		let subject_id = subject.id();
		let allowed = Predicate::or([
			allow.into_predicate(subject_id),
			Predicate::acl_user(subject_id, action),
			Predicate::acl_group(subject.groups(), action),
		]);
		let denied = deny.into_predicate(subject_id);

		let predicate = Predicate::and([allowed, Predicate::negate(denied)]);
		trace!(predicate = %predicate, "partial evaluation complete");
		Ok(predicate)
	}
}

/// Permission matches of one effect, grouped by level.
#[derive(Default)]
struct Conditions {
	site: bool,
	orgs: Vec<OrgId>,
	owner: bool,
}

impl Conditions {
	fn into_predicate(self, subject_id: UserId) -> Predicate {
		Predicate::or([
			Predicate::Bool(self.site),
			Predicate::org_owner_in(self.orgs),
			if self.owner {
				Predicate::owner_eq(subject_id)
			} else {
				Predicate::FALSE
			},
		])
	}
}

fn conditions_for<'a>(
	effect: Effect,
	allow: &'a mut Conditions,
	deny: &'a mut Conditions,
) -> &'a mut Conditions {
	match effect {
		Effect::Allow => allow,
		Effect::Deny => deny,
	}
}
