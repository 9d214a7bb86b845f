// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role-based, scope-aware authorization for Loom server.
//!
//! This crate provides:
//! - The role and permission model (built-in and organization roles)
//! - Full evaluation of a (subject, action, object) decision
//! - Partial evaluation into a [`Predicate`] for filtering collections in
//!   memory or in SQL
//! - Collection filtering helpers and a recording authorizer for tests
//! - The policy artifact and its configuration layer
//!
//! # Usage
//!
//! ```ignore
//! use loom_server_rbac::{Action, Authorizer, Object, RbacAuthorizer, ResourceType, Subject};
//!
//! let authorizer = RbacAuthorizer::new()?;
//! let subject = Subject::with_role_names(user_id, ["member"]);
//! let workspace = Object::new(ResourceType::WORKSPACE).with_owner(user_id);
//! authorizer.authorize(&subject, Action::Update, &workspace)?;
//! ```

pub mod authorizer;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod object;
pub mod policy;
pub mod predicate;
pub mod recorder;
pub mod role;
pub mod scope;
pub mod subject;
pub mod types;

pub use authorizer::{Authorizer, Decision, RbacAuthorizer};
pub use config::{load_config, ConfigError, RbacConfig, RbacConfigLayer};
pub use context::RequestContext;
pub use error::{ForbiddenError, RbacError};
pub use filter::{filter, filter_by_role_name, filter_with_predicate};
pub use object::{Object, Objecter};
pub use policy::Policy;
pub use predicate::{AclTable, Predicate, SqlColumns, SqlFilter};
pub use recorder::{pair, ActionObjectPair, RecorderError, RecordingAuthorizer};
pub use role::{
	can_assign_role, is_org_role, organization_roles, role_by_name, site_roles, ExpandableRoles,
	Permission, Role, RoleNames, RoleRegistry, RoleSet, RoleTemplate,
};
pub use scope::{Scope, ScopeName};
pub use subject::Subject;
pub use types::{Action, Effect, GroupId, Level, OrgId, PermissionAction, ResourceType, UserId};
