// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Protected resources and their stores for Loom server.
//!
//! Stores here never make authorization decisions. Wrap them with
//! `loom-server-authzquery` to get a store that checks every operation.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod testing;
pub mod types;

pub use error::{DbError, Result};
pub use memory::MemoryStore;
pub use sqlite::{template_columns, workspace_columns, SqliteStore};
pub use store::Store;
pub use types::{
	GroupAcl, InsertTemplateParams, InsertUserParams, InsertWorkspaceParams, Template,
	TemplateFilter, TemplateId, UpdateTemplateDeletedParams, UpdateTemplateMetaParams,
	UpdateUserProfileParams, UpdateUserRolesParams, UpdateWorkspaceDeletedParams,
	UpdateWorkspaceParams, User, UserAcl, UserFilter, Workspace, WorkspaceFilter, WorkspaceId,
};
