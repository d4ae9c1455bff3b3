//! Directory queries behind the report: filter lists and membership search.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info};

use super::model::{FilterSelection, MembershipRow, Query, Report, SearchOutcome};
use crate::error::{ApiError, ReportError};
use crate::graph::models::{first_group_type, Collection, Group, MembershipGroup, User};
use crate::graph::{get_json, DirectoryApi};

const USERS_ENDPOINT: &str = "/users?$select=userPrincipalName";
const GROUPS_ENDPOINT: &str = "/groups?$select=displayName";

/// Both filter lists, fetched concurrently. Each list succeeds or fails on its own.
#[derive(Debug)]
pub struct FilterLists {
    pub users: Result<Vec<String>, ApiError>,
    pub groups: Result<Vec<String>, ApiError>,
}

/// Translates filter selections into Graph queries and shapes the answers into rows.
#[derive(Clone)]
pub struct ReportBuilder {
    api: Arc<dyn DirectoryApi>,
}

impl ReportBuilder {
    pub fn new(api: Arc<dyn DirectoryApi>) -> Self {
        Self { api }
    }

    /// Every user principal name in the tenant, in directory order.
    pub async fn list_user_principal_names(&self) -> Result<Vec<String>, ApiError> {
        let users: Vec<User> = self.collect_pages(USERS_ENDPOINT).await?;
        Ok(users
            .into_iter()
            .filter_map(|u| u.user_principal_name)
            .collect())
    }

    /// Every group display name in the tenant, in directory order.
    pub async fn list_group_names(&self) -> Result<Vec<String>, ApiError> {
        let groups: Vec<Group> = self.collect_pages(GROUPS_ENDPOINT).await?;
        Ok(groups.into_iter().filter_map(|g| g.display_name).collect())
    }

    pub async fn populate_filters(&self) -> FilterLists {
        let (users, groups) = tokio::join!(
            self.list_user_principal_names(),
            self.list_group_names()
        );
        FilterLists { users, groups }
    }

    /// Run the search for `selection`.
    ///
    /// An empty selection fails validation before any request is made.
    pub async fn search(&self, selection: &FilterSelection) -> Result<SearchOutcome, ReportError> {
        let outcome = match selection.query()? {
            Query::ByUser(upn) => self.memberships_of(&upn).await?,
            Query::ByGroup(name) => self.members_of(&name).await?,
        };
        Ok(outcome)
    }

    async fn memberships_of(&self, upn: &str) -> Result<SearchOutcome, ApiError> {
        let endpoint = format!(
            "/users/{}/memberOf?$select=displayName,groupTypes",
            urlencoding::encode(upn)
        );
        let groups: Vec<MembershipGroup> = self.collect_pages(&endpoint).await?;
        info!("{} belongs to {} groups", upn, groups.len());

        if groups.is_empty() {
            return Ok(SearchOutcome::UserHasNoMemberships);
        }

        let rows = groups
            .into_iter()
            .map(|group| MembershipRow {
                user_principal_name: Some(upn.to_string()),
                group_type: first_group_type(&group.group_types),
                group: group.display_name,
                user_mail: None,
            })
            .collect();

        Ok(SearchOutcome::Rows(Report::new(rows)))
    }

    async fn members_of(&self, name: &str) -> Result<SearchOutcome, ApiError> {
        let filter = format!("displayName eq {}", odata_string(name));
        let endpoint = format!(
            "/groups?$filter={}&$expand=members($select=userPrincipalName,mail)",
            urlencoding::encode(&filter)
        );
        let page: Collection<Group> = get_json(self.api.as_ref(), &endpoint).await?;

        // Display names are not unique; the first match is reported.
        let Some(group) = page.value.into_iter().next() else {
            debug!("No group named {:?}", name);
            return Ok(SearchOutcome::GroupHasNoMembers);
        };

        let members = group.members.unwrap_or_default();
        info!("{} has {} members", name, members.len());
        if members.is_empty() {
            return Ok(SearchOutcome::GroupHasNoMembers);
        }

        let group_type = first_group_type(&group.group_types);
        let group_name = group.display_name.unwrap_or_else(|| name.to_string());
        let rows = members
            .into_iter()
            .map(|member| MembershipRow {
                user_principal_name: member.user_principal_name,
                group: Some(group_name.clone()),
                group_type: group_type.clone(),
                user_mail: member.mail,
            })
            .collect();

        Ok(SearchOutcome::Rows(Report::new(rows)))
    }

    /// Fetch a collection, following `@odata.nextLink` until exhausted.
    async fn collect_pages<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(endpoint.to_string());

        while let Some(url) = next {
            let page: Collection<T> = get_json(self.api.as_ref(), &url).await?;
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }
}

/// Quote a value as an OData string literal.
pub fn odata_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
