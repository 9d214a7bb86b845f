// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Residual predicates produced by partial evaluation.
//!
//! When the object is not known yet, the evaluator decides everything that
//! depends only on the subject (roles, scope, site permissions) and leaves
//! a [`Predicate`] over the object attributes it could not see: the owner,
//! the owning organization and the ACL lists.
//!
//! A predicate can be applied to objects in memory with
//! [`Predicate::matches`], or translated into a parameterised SQL `WHERE`
//! fragment with [`Predicate::to_sql`] so a store can filter rows without
//! loading them.
//!
//! The smart constructors fold constants, so a predicate that does not
//! depend on the object collapses to [`Predicate::TRUE`] or
//! [`Predicate::FALSE`].

use std::fmt;

use crate::object::Object;
use crate::types::{Action, GroupId, OrgId, UserId, WILDCARD_SYMBOL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
	Bool(bool),
	/// `object.owner == user`
	OwnerEq(UserId),
	/// `object.org_owner IN orgs`; the list is sorted and deduplicated.
	OrgOwnerIn(Vec<OrgId>),
	/// The object's user ACL grants `action` to `user`.
	AclUserAllows { user: UserId, action: Action },
	/// The object's group ACL grants `action` to one of `groups`.
	AclGroupAllows { groups: Vec<GroupId>, action: Action },
	Not(Box<Predicate>),
	And(Vec<Predicate>),
	Or(Vec<Predicate>),
}

impl Predicate {
	pub const TRUE: Predicate = Predicate::Bool(true);
	pub const FALSE: Predicate = Predicate::Bool(false);

	pub fn owner_eq(user: UserId) -> Self {
		Predicate::OwnerEq(user)
	}

	pub fn org_owner_in(orgs: impl IntoIterator<Item = OrgId>) -> Self {
		let mut orgs: Vec<OrgId> = orgs.into_iter().collect();
		if orgs.is_empty() {
			return Predicate::FALSE;
		}
		orgs.sort();
		orgs.dedup();
		Predicate::OrgOwnerIn(orgs)
	}

	pub fn acl_user(user: UserId, action: Action) -> Self {
		Predicate::AclUserAllows { user, action }
	}

	pub fn acl_group(groups: &[GroupId], action: Action) -> Self {
		if groups.is_empty() {
			return Predicate::FALSE;
		}
		let mut groups = groups.to_vec();
		groups.sort();
		groups.dedup();
		Predicate::AclGroupAllows { groups, action }
	}

	pub fn negate(predicate: Predicate) -> Self {
		match predicate {
			Predicate::Bool(b) => Predicate::Bool(!b),
			Predicate::Not(inner) => *inner,
			other => Predicate::Not(Box::new(other)),
		}
	}

	/// Conjunction. Drops `true` terms; any `false` term makes the whole `false`.
	pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
		let mut terms = Vec::new();
		for predicate in predicates {
			match predicate {
				Predicate::Bool(true) => {}
				Predicate::Bool(false) => return Predicate::FALSE,
				Predicate::And(nested) => terms.extend(nested),
				other => terms.push(other),
			}
		}
		match terms.len() {
			0 => Predicate::TRUE,
			1 => terms.remove(0),
			_ => Predicate::And(terms),
		}
	}

	/// Disjunction. Drops `false` terms; any `true` term makes the whole `true`.
	pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Self {
		let mut terms = Vec::new();
		for predicate in predicates {
			match predicate {
				Predicate::Bool(false) => {}
				Predicate::Bool(true) => return Predicate::TRUE,
				Predicate::Or(nested) => terms.extend(nested),
				other => terms.push(other),
			}
		}
		match terms.len() {
			0 => Predicate::FALSE,
			1 => terms.remove(0),
			_ => Predicate::Or(terms),
		}
	}

	pub fn is_true(&self) -> bool {
		matches!(self, Predicate::Bool(true))
	}

	pub fn is_false(&self) -> bool {
		matches!(self, Predicate::Bool(false))
	}

	/// Evaluate the predicate against a concrete object.
	pub fn matches(&self, object: &Object) -> bool {
		match self {
			Predicate::Bool(b) => *b,
			Predicate::OwnerEq(user) => object.owner.as_ref() == Some(user),
			Predicate::OrgOwnerIn(orgs) => object
				.org_owner
				.as_ref()
				.is_some_and(|org| orgs.binary_search(org).is_ok()),
			Predicate::AclUserAllows { user, action } => object.acl_grants_user(user, *action),
			Predicate::AclGroupAllows { groups, action } => {
				object.acl_grants_any_group(groups, *action)
			}
			Predicate::Not(inner) => !inner.matches(object),
			Predicate::And(terms) => terms.iter().all(|t| t.matches(object)),
			Predicate::Or(terms) => terms.iter().any(|t| t.matches(object)),
		}
	}

	/// Translate into a SQL `WHERE` fragment with `?` placeholders.
	///
	/// Attributes the table does not have are treated as never matching,
	/// so a missing column can only narrow the result.
	pub fn to_sql(&self, columns: &SqlColumns) -> SqlFilter {
		let mut params = Vec::new();
		let clause = self.write_sql(columns, &mut params);
		SqlFilter { clause, params }
	}

	fn write_sql(&self, columns: &SqlColumns, params: &mut Vec<String>) -> String {
		match self {
			Predicate::Bool(true) => "1=1".to_string(),
			Predicate::Bool(false) => "1=0".to_string(),
			Predicate::OwnerEq(user) => match &columns.owner {
				Some(column) => {
					params.push(user.to_string());
					format!("({column} IS NOT NULL AND {column} = ?)")
				}
				None => "1=0".to_string(),
			},
			Predicate::OrgOwnerIn(orgs) => match &columns.org_owner {
				Some(column) => {
					let placeholders = vec!["?"; orgs.len()].join(", ");
					params.extend(orgs.iter().map(ToString::to_string));
					format!("({column} IS NOT NULL AND {column} IN ({placeholders}))")
				}
				None => "1=0".to_string(),
			},
			Predicate::AclUserAllows { user, action } => match &columns.acl_users {
				Some(acl) => {
					params.push(user.to_string());
					acl.exists_clause(&columns.id, "?", *action, params)
				}
				None => "1=0".to_string(),
			},
			Predicate::AclGroupAllows { groups, action } => match &columns.acl_groups {
				Some(acl) => {
					let placeholders = vec!["?"; groups.len()].join(", ");
					params.extend(groups.iter().map(ToString::to_string));
					acl.exists_clause(&columns.id, &format!("IN ({placeholders})"), *action, params)
				}
				None => "1=0".to_string(),
			},
			Predicate::Not(inner) => format!("NOT ({})", inner.write_sql(columns, params)),
			Predicate::And(terms) => join_sql(terms, " AND ", columns, params),
			Predicate::Or(terms) => join_sql(terms, " OR ", columns, params),
		}
	}
}

fn join_sql(
	terms: &[Predicate],
	separator: &str,
	columns: &SqlColumns,
	params: &mut Vec<String>,
) -> String {
	let parts: Vec<String> = terms
		.iter()
		.map(|t| t.write_sql(columns, params))
		.collect();
	format!("({})", parts.join(separator))
}

impl fmt::Display for Predicate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Predicate::Bool(b) => write!(f, "{b}"),
			Predicate::OwnerEq(user) => write!(f, "owner = {user}"),
			Predicate::OrgOwnerIn(orgs) => {
				write!(f, "org_owner IN (")?;
				write_list(f, orgs)?;
				write!(f, ")")
			}
			Predicate::AclUserAllows { user, action } => {
				write!(f, "acl_user_list[{user}] contains {action}")
			}
			Predicate::AclGroupAllows { groups, action } => {
				write!(f, "acl_group_list[")?;
				write_list(f, groups)?;
				write!(f, "] contains {action}")
			}
			Predicate::Not(inner) => write!(f, "NOT ({inner})"),
			Predicate::And(terms) => write_joined(f, terms, " AND "),
			Predicate::Or(terms) => write_joined(f, terms, " OR "),
		}
	}
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
	for (i, item) in items.iter().enumerate() {
		if i > 0 {
			write!(f, ", ")?;
		}
		write!(f, "{item}")?;
	}
	Ok(())
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Predicate], separator: &str) -> fmt::Result {
	write!(f, "(")?;
	for (i, term) in terms.iter().enumerate() {
		if i > 0 {
			f.write_str(separator)?;
		}
		write!(f, "{term}")?;
	}
	write!(f, ")")
}

// =============================================================================
// SQL translation
// =============================================================================

/// Column names a table exposes for predicate translation.
///
/// Names are interpolated into the generated SQL verbatim and must come from
/// code, never from user input. Values are always bound as parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlColumns {
	/// Primary key, used to join ACL tables.
	pub id: String,
	pub owner: Option<String>,
	pub org_owner: Option<String>,
	pub acl_users: Option<AclTable>,
	pub acl_groups: Option<AclTable>,
}

impl SqlColumns {
	pub fn new(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			owner: None,
			org_owner: None,
			acl_users: None,
			acl_groups: None,
		}
	}

	pub fn owner(mut self, column: impl Into<String>) -> Self {
		self.owner = Some(column.into());
		self
	}

	pub fn org_owner(mut self, column: impl Into<String>) -> Self {
		self.org_owner = Some(column.into());
		self
	}

	pub fn acl_users(mut self, table: AclTable) -> Self {
		self.acl_users = Some(table);
		self
	}

	pub fn acl_groups(mut self, table: AclTable) -> Self {
		self.acl_groups = Some(table);
		self
	}
}

/// A side table holding one row per (object, grantee, action) grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclTable {
	pub table: String,
	pub object_column: String,
	pub grantee_column: String,
	pub action_column: String,
}

impl AclTable {
	pub fn new(
		table: impl Into<String>,
		object_column: impl Into<String>,
		grantee_column: impl Into<String>,
		action_column: impl Into<String>,
	) -> Self {
		Self {
			table: table.into(),
			object_column: object_column.into(),
			grantee_column: grantee_column.into(),
			action_column: action_column.into(),
		}
	}

	/// `grantee_match` is either `?` (grantee already pushed) or `IN (?, ...)`.
	fn exists_clause(
		&self,
		id_column: &str,
		grantee_match: &str,
		action: Action,
		params: &mut Vec<String>,
	) -> String {
		params.push(action.to_string());
		params.push(WILDCARD_SYMBOL.to_string());
		let grantee = if grantee_match == "?" {
			format!("{} = ?", self.grantee_column)
		} else {
			format!("{} {grantee_match}", self.grantee_column)
		};
		format!(
			"EXISTS (SELECT 1 FROM {table} WHERE {table}.{object} = {id_column} AND {table}.{grantee} AND {table}.{action_column} IN (?, ?))",
			table = self.table,
			object = self.object_column,
			action_column = self.action_column,
		)
	}
}

/// A translated predicate: the clause and its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFilter {
	pub clause: String,
	pub params: Vec<String>,
}
