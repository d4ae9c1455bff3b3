//! Report data: membership rows, filter selection and search outcomes.

use crate::error::ReportError;

/// Rendered in place of any value missing from the directory data.
pub const NOT_APPLICABLE: &str = "N/A";

/// Fixed table header; every row has exactly one cell per column.
pub const COLUMNS: [&str; 4] = ["UserPrincipalName", "Group", "Group Type", "User Mail"];

/// One user-group relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipRow {
    pub user_principal_name: Option<String>,
    pub group: Option<String>,
    pub group_type: Option<String>,
    pub user_mail: Option<String>,
}

impl MembershipRow {
    /// Cell texts in column order; absent or empty values become `N/A`.
    pub fn cells(&self) -> [&str; 4] {
        [
            cell(&self.user_principal_name),
            cell(&self.group),
            cell(&self.group_type),
            cell(&self.user_mail),
        ]
    }
}

fn cell(value: &Option<String>) -> &str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => NOT_APPLICABLE,
    }
}

/// Ordered rows of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    rows: Vec<MembershipRow>,
}

impl Report {
    pub fn new(rows: Vec<MembershipRow>) -> Self {
        Self { rows }
    }

    pub fn header(&self) -> [&'static str; 4] {
        COLUMNS
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows as cell texts, in order.
    pub fn cell_rows(&self) -> Vec<[&str; 4]> {
        self.rows.iter().map(MembershipRow::cells).collect()
    }
}

/// What the operator picked to search by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub user: Option<String>,
    pub group: Option<String>,
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    ByUser(String),
    ByGroup(String),
}

impl FilterSelection {
    #[cfg(test)]
    pub fn by_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            group: None,
        }
    }

    #[cfg(test)]
    pub fn by_group(group: impl Into<String>) -> Self {
        Self {
            user: None,
            group: Some(group.into()),
        }
    }

    /// Resolve the selection; the user identifier wins when both are set.
    pub fn query(&self) -> Result<Query, ReportError> {
        if let Some(user) = non_blank(&self.user) {
            return Ok(Query::ByUser(user.to_string()));
        }

        if let Some(group) = non_blank(&self.group) {
            return Ok(Query::ByGroup(group.to_string()));
        }

        Err(ReportError::Validation(
            "Please select a UserPrincipalName or Group Name to search.".to_string(),
        ))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Result of a search; the empty cases are informational, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Rows(Report),
    UserHasNoMemberships,
    GroupHasNoMembers,
}

impl SearchOutcome {
    /// Informational alert for empty outcomes.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::Rows(_) => None,
            Self::UserHasNoMemberships => Some("The selected user is not part of any group."),
            Self::GroupHasNoMembers => Some("The selected group does not have any members."),
        }
    }
}
