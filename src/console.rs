//! Interactive console and one-shot runners.
//!
//! Every command is handled at its own boundary: failures are printed as
//! alerts and the loop carries on.

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use url::Url;

use crate::app::{App, SearchSummary};
use crate::auth::Account;
use crate::error::{Action, AppError};

const HELP: &str = "\
Commands:
  login                 Sign in through the browser and load the filter lists
  logout                Sign out and clear everything on screen
  status                Show the signed-in account and token lifetime
  users                 List loaded user principal names
  groups                List loaded group names
  user <upn|#n>         Select a user (by name or list number)
  group <name|#n>       Select a group (by name or list number)
  clear                 Clear both selections
  search                Run the search and show the report
  show                  Show the current report
  export [path]         Save the report as CSV
  mail <recipient>      Email the report
  reset                 Clear the report
  help                  Show this help
  quit | exit           Leave";

/// A console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login,
    Logout,
    Status,
    Users,
    Groups,
    User(String),
    Group(String),
    Clear,
    Search,
    Show,
    Export(Option<PathBuf>),
    Mail(String),
    Reset,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "status" | "whoami" => Self::Status,
            "users" => Self::Users,
            "groups" => Self::Groups,
            "user" if !rest.is_empty() => Self::User(rest.to_string()),
            "user" => return Err("Usage: user <upn|#n>".to_string()),
            "group" if !rest.is_empty() => Self::Group(rest.to_string()),
            "group" => return Err("Usage: group <name|#n>".to_string()),
            "clear" => Self::Clear,
            "search" => Self::Search,
            "show" => Self::Show,
            "export" => Self::Export((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "mail" => Self::Mail(rest.to_string()),
            "reset" => Self::Reset,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("Unknown command: {}. Type `help`.", other)),
        };

        Ok(Some(command))
    }
}

/// Whether the console keeps running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run the interactive console on stdin/stdout until `quit` or end of input.
pub async fn run(app: &mut App, title: &str) -> Result<()> {
    let mut out = std::io::stdout();
    writeln!(out, "{}", title)?;
    writeln!(out, "Type `help` for commands.")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                writeln!(out, "{}", usage)?;
                continue;
            }
        };

        debug!("Console command: {:?}", command);
        if execute(app, command, &mut out).await? == Flow::Quit {
            break;
        }
    }

    info!("Console closed");
    Ok(())
}

/// Execute one command, writing output and alerts to `out`.
///
/// Only output errors are returned; action failures become alerts.
pub async fn execute(app: &mut App, command: Command, out: &mut impl Write) -> Result<Flow> {
    match command {
        Command::Login => {
            login(app, out).await?;
        }
        Command::Logout => {
            match app.logout().await {
                Some(url) => {
                    writeln!(out, "Logout successful.")?;
                    writeln!(out, "If the sign-out page did not open, visit: {}", url)?;
                }
                None => writeln!(out, "Not signed in.")?,
            }
        }
        Command::Status => status(app, out).await?,
        Command::Users => list(out, "users", &app.options().users)?,
        Command::Groups => list(out, "groups", &app.options().groups)?,
        Command::User(value) => match app.select_user(&value) {
            Ok(user) => writeln!(out, "User: {}", user)?,
            Err(e) => alert(out, &e, Action::Search)?,
        },
        Command::Group(value) => match app.select_group(&value) {
            Ok(group) => writeln!(out, "Group: {}", group)?,
            Err(e) => alert(out, &e, Action::Search)?,
        },
        Command::Clear => {
            app.clear_selection();
            writeln!(out, "Selection cleared.")?;
        }
        Command::Search => match app.search().await {
            Ok(SearchSummary::Rendered(_)) => write!(out, "{}", app.view().draw())?,
            Ok(SearchSummary::Empty(notice)) => writeln!(out, "{}", notice)?,
            Err(e) => alert(out, &e, Action::Search)?,
        },
        Command::Show => match app.view().current() {
            Some(_) => {
                write!(out, "{}", app.view().draw())?;
                writeln!(out, "{} row(s)", app.view().row_count())?;
            }
            None => writeln!(out, "No report displayed.")?,
        },
        Command::Export(path) => match app.export_csv(path.as_deref()) {
            Ok(path) => writeln!(out, "Report saved to {}", path.display())?,
            Err(e) => alert(out, &e, Action::Export)?,
        },
        Command::Mail(recipient) => match app.send_report(&recipient).await {
            Ok(()) => writeln!(out, "Report sent successfully!")?,
            Err(e) => alert(out, &e, Action::SendMail)?,
        },
        Command::Reset => {
            app.reset();
            writeln!(out, "Screen has been reset.")?;
        }
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => return Ok(Flow::Quit),
    }

    Ok(Flow::Continue)
}

fn alert(out: &mut impl Write, error: &AppError, action: Action) -> std::io::Result<()> {
    writeln!(out, "{}", error.user_message(action))
}

fn print_auth_url(out: &mut impl Write, url: &Url) {
    let _ = writeln!(out, "Opening the browser for sign-in. If it does not open, visit:");
    let _ = writeln!(out, "  {}", url);
    let _ = out.flush();
}

async fn login(app: &mut App, out: &mut impl Write) -> Result<Option<Account>> {
    let result = app.login(|url| print_auth_url(out, url)).await;
    let account = match result {
        Ok(account) => account,
        Err(e) => {
            alert(out, &e, Action::Login)?;
            return Ok(None);
        }
    };

    writeln!(out, "Login successful.")?;
    writeln!(out, "Signed in as {}", account.label())?;

    for failure in app.populate_filters().await {
        writeln!(out, "{}", failure)?;
    }
    writeln!(
        out,
        "Loaded {} users and {} groups.",
        app.options().users.len(),
        app.options().groups.len()
    )?;

    Ok(Some(account))
}

async fn status(app: &App, out: &mut impl Write) -> Result<()> {
    let Some(status) = app.status().await else {
        writeln!(out, "Not signed in.")?;
        return Ok(());
    };

    writeln!(out, "Signed in as {}", status.account.label())?;
    if let Some(tenant) = &status.account.tenant_id {
        writeln!(out, "Tenant: {}", tenant)?;
    }
    if let Some(oid) = &status.account.object_id {
        writeln!(out, "Object ID: {}", oid)?;
    }
    writeln!(out, "Token expires in {}", status.remaining())?;

    let selection = app.selection();
    writeln!(
        out,
        "Selection: user={} group={}",
        selection.user.as_deref().unwrap_or("-"),
        selection.group.as_deref().unwrap_or("-")
    )?;

    match app.profile().await {
        Ok(profile) => {
            if let Some(name) = profile.display_name {
                writeln!(out, "Name: {}", name)?;
            }
            if let Some(upn) = profile.user_principal_name {
                writeln!(out, "UPN: {}", upn)?;
            }
            if let Some(mail) = profile.mail {
                writeln!(out, "Mail: {}", mail)?;
            }
            if let Some(title) = profile.job_title {
                writeln!(out, "Title: {}", title)?;
            }
        }
        Err(e) if e.requires_sign_in() => {
            writeln!(out, "{}", e.user_message(Action::Login))?;
        }
        Err(e) => debug!("Profile lookup failed: {}", e),
    }
    Ok(())
}

fn list(out: &mut impl Write, kind: &str, items: &[String]) -> Result<()> {
    if items.is_empty() {
        writeln!(out, "No {} loaded. Run `login` first.", kind)?;
        return Ok(());
    }

    let width = items.len().to_string().len();
    for (i, item) in items.iter().enumerate() {
        writeln!(out, "#{:<width$} {}", i + 1, item, width = width)?;
    }
    Ok(())
}

/// Which list the one-shot `list` subcommand prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ListKind {
    Users,
    Groups,
}

/// Sign in, load the filters and print one of them.
pub async fn list_once(app: &mut App, kind: ListKind) -> Result<()> {
    let mut out = std::io::stdout();
    if login(app, &mut out).await?.is_none() {
        anyhow::bail!("Login failed");
    }

    let command = match kind {
        ListKind::Users => Command::Users,
        ListKind::Groups => Command::Groups,
    };
    execute(app, command, &mut out).await?;
    Ok(())
}

/// What the one-shot `report` subcommand should do.
#[derive(Debug, Clone, Default)]
pub struct ReportRequest {
    pub user: Option<String>,
    pub group: Option<String>,
    pub csv: Option<PathBuf>,
    pub mail_to: Option<String>,
}

/// Sign in, search once, then export and/or mail the result.
///
/// Fails when any requested step fails so the exit status reflects it.
pub async fn report_once(app: &mut App, request: ReportRequest) -> Result<()> {
    let mut out = std::io::stdout();
    if login(app, &mut out).await?.is_none() {
        anyhow::bail!("Login failed");
    }

    if let Some(user) = &request.user {
        app.select_user(user).map_err(|e| anyhow::anyhow!(e.user_message(Action::Search)))?;
    }
    if let Some(group) = &request.group {
        app.select_group(group).map_err(|e| anyhow::anyhow!(e.user_message(Action::Search)))?;
    }

    match app.search().await {
        Ok(SearchSummary::Rendered(_)) => write!(out, "{}", app.view().draw())?,
        Ok(SearchSummary::Empty(notice)) => {
            writeln!(out, "{}", notice)?;
            return Ok(());
        }
        Err(e) => anyhow::bail!(e.user_message(Action::Search)),
    }

    if let Some(path) = &request.csv {
        let written = app
            .export_csv(Some(path.as_path()))
            .map_err(|e| anyhow::anyhow!(e.user_message(Action::Export)))?;
        writeln!(out, "Report saved to {}", written.display())?;
    }

    if let Some(recipient) = &request.mail_to {
        app.send_report(recipient)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message(Action::SendMail)))?;
        writeln!(out, "Report sent successfully!")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenProvider;
    use crate::config::tests::test_config;
    use crate::testing::FakeDirectory;
    use serde_json::json;
    use std::sync::Arc;

    fn app_with(fake: FakeDirectory) -> App {
        let config = test_config();
        let tokens = Arc::new(TokenProvider::new(&config).unwrap());
        App::with_parts(tokens, Arc::new(fake), config.report.clone())
    }

    async fn run_lines(app: &mut App, lines: &[&str]) -> String {
        let mut out = Vec::new();
        for line in lines {
            if let Some(command) = Command::parse(line).unwrap() {
                execute(app, command, &mut out).await.unwrap();
            }
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("  ").unwrap(), None);
        assert_eq!(Command::parse("LOGIN").unwrap(), Some(Command::Login));
        assert_eq!(
            Command::parse("user  alice@contoso.com ").unwrap(),
            Some(Command::User("alice@contoso.com".into()))
        );
        assert_eq!(
            Command::parse("group Sales EMEA").unwrap(),
            Some(Command::Group("Sales EMEA".into()))
        );
        assert_eq!(Command::parse("export").unwrap(), Some(Command::Export(None)));
        assert_eq!(
            Command::parse("export out/report.csv").unwrap(),
            Some(Command::Export(Some(PathBuf::from("out/report.csv"))))
        );
        assert_eq!(Command::parse("mail").unwrap(), Some(Command::Mail(String::new())));
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("user").unwrap_err().starts_with("Usage"));
        assert!(Command::parse("frobnicate").unwrap_err().contains("Unknown command"));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_console() {
        let mut app = app_with(FakeDirectory::new());

        let output = run_lines(&mut app, &["search", "mail ops@contoso.com", "export", "show"]).await;
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Please select a UserPrincipalName or Group Name to search.",
                "No data to send. Please retrieve and display user details first.",
                "No data to download.",
                "No report displayed.",
            ]
        );
    }

    #[tokio::test]
    async fn test_group_search_then_reset() {
        let endpoint = "/groups?$filter=displayName%20eq%20%27Sales%27&$expand=members($select=userPrincipalName,mail)";
        let mut app = app_with(FakeDirectory::new().with(
            endpoint,
            json!({"value": [{
                "displayName": "Sales",
                "groupTypes": ["Unified"],
                "members": [{"userPrincipalName": "bob@contoso.com", "mail": "bob@contoso.com"}]
            }]}),
        ));

        let output = run_lines(&mut app, &["group Sales", "search"]).await;
        assert!(output.starts_with("Group: Sales\n"));
        assert!(output.contains("bob@contoso.com"));
        assert!(output.contains("Sales  Unified"));

        let output = run_lines(&mut app, &["reset", "show"]).await;
        assert_eq!(output, "Screen has been reset.\nNo report displayed.\n");
    }

    #[tokio::test]
    async fn test_quit_and_status() {
        let mut app = app_with(FakeDirectory::new());
        let mut out = Vec::new();

        assert_eq!(
            execute(&mut app, Command::Status, &mut out).await.unwrap(),
            Flow::Continue
        );
        assert_eq!(String::from_utf8(out).unwrap(), "Not signed in.\n");

        let mut out = Vec::new();
        assert_eq!(
            execute(&mut app, Command::Quit, &mut out).await.unwrap(),
            Flow::Quit
        );
    }

    #[tokio::test]
    async fn test_lists_before_login() {
        let mut app = app_with(FakeDirectory::new());
        let output = run_lines(&mut app, &["users", "groups", "user #1"]).await;
        assert_eq!(
            output,
            "No users loaded. Run `login` first.\n\
             No groups loaded. Run `login` first.\n\
             No user #1 in the loaded list.\n"
        );
    }
}
