//! Application state and the actions the operator can take.
//!
//! `App` owns the session, the filter lists, the current selection and the
//! displayed report. Each action returns a `Result` so the caller can turn
//! failures into alerts without losing the rest of the state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use crate::auth::token_provider::SessionStatus;
use crate::auth::{Account, TokenProvider};
use crate::config::{Config, ReportConfig};
use crate::error::{AppError, ReportError};
use crate::graph::models::Profile;
use crate::graph::{get_json, ApiClient, DirectoryApi};
use crate::present::{csv, mail, ReportView};
use crate::report::{FilterSelection, Report, ReportBuilder, SearchOutcome};

/// Values offered for the two filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

/// Outcome of a search as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchSummary {
    /// Rows are now displayed.
    Rendered(usize),
    /// Nothing matched; the table was cleared.
    Empty(&'static str),
}

pub struct App {
    tokens: Arc<TokenProvider>,
    api: Arc<dyn DirectoryApi>,
    builder: ReportBuilder,
    report_config: ReportConfig,
    options: FilterOptions,
    selection: FilterSelection,
    view: ReportView,
}

impl App {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let tokens = Arc::new(TokenProvider::new(config)?);
        let api: Arc<dyn DirectoryApi> = Arc::new(ApiClient::new(config, tokens.clone())?);
        Ok(Self::with_parts(tokens, api, config.report.clone()))
    }

    pub fn with_parts(
        tokens: Arc<TokenProvider>,
        api: Arc<dyn DirectoryApi>,
        report_config: ReportConfig,
    ) -> Self {
        Self {
            builder: ReportBuilder::new(api.clone()),
            tokens,
            api,
            report_config,
            options: FilterOptions::default(),
            selection: FilterSelection::default(),
            view: ReportView::new(),
        }
    }

    pub async fn login(&mut self, on_auth_url: impl FnOnce(&Url)) -> Result<Account, AppError> {
        let account = self.tokens.login(on_auth_url).await.map_err(|e| {
            error!("Login failed: {}", e);
            AppError::from(e)
        })?;
        Ok(account)
    }

    /// End the session and forget everything fetched under it.
    ///
    /// The identity provider sign-out page is opened on a best-effort basis;
    /// its URL is returned so it can be shown if the browser did not open.
    pub async fn logout(&mut self) -> Option<Url> {
        self.options = FilterOptions::default();
        self.selection = FilterSelection::default();
        self.view.reset();

        let url = self.tokens.logout().await?;
        if let Err(e) = open::that(url.as_str()) {
            warn!("Could not open the sign-out page: {}", e);
        }
        Some(url)
    }

    pub async fn status(&self) -> Option<SessionStatus> {
        self.tokens.status().await
    }

    /// The operator's directory profile.
    pub async fn profile(&self) -> Result<Profile, AppError> {
        let profile =
            get_json(self.api.as_ref(), "/me?$select=displayName,userPrincipalName,mail,jobTitle")
                .await?;
        Ok(profile)
    }

    /// Load both filter lists. Returns one alert per list that failed; a list
    /// that loaded is kept even when the other did not.
    pub async fn populate_filters(&mut self) -> Vec<&'static str> {
        let lists = self.builder.populate_filters().await;
        let mut failures = Vec::new();

        match lists.users {
            Ok(users) => self.options.users = users,
            Err(e) => {
                error!("Error populating UserPrincipalName filter: {}", e);
                failures.push("Failed to populate UserPrincipalName filter.");
            }
        }

        match lists.groups {
            Ok(groups) => self.options.groups = groups,
            Err(e) => {
                error!("Error populating Group Name filter: {}", e);
                failures.push("Failed to populate Group Name filter.");
            }
        }

        info!(
            "Filters populated: {} users, {} groups",
            self.options.users.len(),
            self.options.groups.len()
        );
        failures
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn view(&self) -> &ReportView {
        &self.view
    }

    /// Pick the user filter value; `#n` picks the n-th loaded user.
    /// Replaces any group filter, since only one filter applies at a time.
    pub fn select_user(&mut self, value: &str) -> Result<String, AppError> {
        let user = pick(value, &self.options.users, "user")?;
        self.selection = FilterSelection {
            user: Some(user.clone()),
            group: None,
        };
        Ok(user)
    }

    /// Pick the group filter value; `#n` picks the n-th loaded group.
    /// Replaces any user filter.
    pub fn select_group(&mut self, value: &str) -> Result<String, AppError> {
        let group = pick(value, &self.options.groups, "group")?;
        self.selection = FilterSelection {
            user: None,
            group: Some(group.clone()),
        };
        Ok(group)
    }

    pub fn clear_selection(&mut self) {
        self.selection = FilterSelection::default();
    }

    /// Search with the current selection and display the result.
    /// A failed lookup clears the table so stale rows cannot be exported or mailed.
    pub async fn search(&mut self) -> Result<SearchSummary, AppError> {
        let outcome = match self.builder.search(&self.selection).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if !matches!(e, ReportError::Validation(_)) {
                    error!("Error searching membership: {}", e);
                    self.view.reset();
                }
                return Err(AppError::from(e));
            }
        };

        match outcome {
            SearchOutcome::Rows(report) => {
                let count = report.len();
                self.view.render(report);
                Ok(SearchSummary::Rendered(count))
            }
            empty => {
                self.view.reset();
                Ok(SearchSummary::Empty(empty.notice().unwrap_or_default()))
            }
        }
    }

    pub fn reset(&mut self) {
        self.view.reset();
    }

    /// Default export location: the configured file name in the working directory.
    pub fn default_export_path(&self) -> PathBuf {
        PathBuf::from(&self.report_config.csv_file_name)
    }

    /// Write the displayed report as CSV.
    pub fn export_csv(&self, path: Option<&Path>) -> Result<PathBuf, AppError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_export_path());

        csv::export(&self.view.report(), &path).map_err(|e| {
            if let ReportError::Export(io) = &e {
                error!("Error writing {}: {}", path.display(), io);
            }
            AppError::from(e)
        })?;
        Ok(path)
    }

    /// Email the displayed report.
    pub async fn send_report(&self, recipient: &str) -> Result<(), AppError> {
        let report: Report = self.view.report();
        mail::send_report(
            self.api.as_ref(),
            &report,
            &self.report_config.mail_subject,
            recipient,
        )
        .await
        .map_err(|e| {
            if !matches!(e, ReportError::Validation(_)) {
                error!("Error sending email: {}", e);
            }
            AppError::from(e)
        })
    }
}

/// Resolve `#n` against `options` (1-based); anything else is taken literally.
fn pick(value: &str, options: &[String], kind: &str) -> Result<String, AppError> {
    let value = value.trim();

    let Some(index) = value.strip_prefix('#') else {
        if !options.is_empty() && !options.iter().any(|o| o == value) {
            warn!("{} {:?} is not in the loaded list", kind, value);
        }
        return Ok(value.to_string());
    };

    index
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
        .ok_or_else(|| {
            AppError::Report(ReportError::Validation(format!(
                "No {} #{} in the loaded list.",
                kind, index
            )))
        })
}
