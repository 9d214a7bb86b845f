// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization-enforcing store for Loom server.
//!
//! Wrap any [`loom_server_db::Store`] in an [`AuthzQuerier`] and every
//! read, list, insert, update and delete is checked against the subject in
//! the operation's [`loom_server_rbac::RequestContext`] before it runs.
//!
//! # Usage
//!
//! ```ignore
//! use loom_server_authzquery::AuthzQuerier;
//! use loom_server_db::{MemoryStore, Store};
//! use loom_server_rbac::{RbacAuthorizer, RequestContext, Subject};
//!
//! let store = AuthzQuerier::new(MemoryStore::new(), Arc::new(RbacAuthorizer::new()?));
//! let ctx = RequestContext::with_subject(Subject::with_role_names(user_id, ["member"]));
//! let workspace = store.get_workspace_by_id(&ctx, workspace_id).await?;
//! ```

pub mod querier;

pub use querier::{AuthzQuerier, AuthzStore};
