//! Runtime configuration
//!
//! Everything is read from environment variables once at startup and carried
//! through the program as an explicit [`Config`]. Parsing goes through a
//! lookup function so it can be exercised without touching the process
//! environment.

use crate::error::{Error, Result};
use crate::types::{Platform, PlatformConfig};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GITHUB_URL: &str = "https://api.github.com";
const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
const DEFAULT_LABEL: &str = "auto-generated";
const DEFAULT_AGENT_ASSIGNEE: &str = "copilot-swe-agent";
const DEFAULT_AGENT_LOGINS: &str = "copilot-swe-agent,copilot";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 900;
const DEFAULT_ISSUES_DIR: &str = "issues";
const DEFAULT_STATE_FILE: &str = "processed_files.json";
const DEFAULT_MATCH_WINDOW_HOURS: i64 = 24;
const DEFAULT_MATCH_BUFFER_MINUTES: i64 = 5;
const DEFAULT_REQUEST_PAGE_SIZE: u8 = 30;
const DEFAULT_MERGE_SETTLE_SECS: u64 = 5;
const DEFAULT_READINESS_RETRY_SECS: u64 = 10;
const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 120;

/// Identities treated as the automated agent
///
/// Logins are compared case-insensitively with any `[bot]` suffix removed,
/// so `Copilot`, `copilot[bot]` and `copilot` are the same identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    logins: Vec<String>,
}

impl AgentIdentity {
    /// Build from a list of logins
    pub fn new<I, S>(logins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for login in logins {
            let login = normalize_login(login.as_ref());
            if !login.is_empty() && !normalized.contains(&login) {
                normalized.push(login);
            }
        }
        Self { logins: normalized }
    }

    /// Whether `login` is one of the agent's identities
    pub fn matches(&self, login: &str) -> bool {
        let login = normalize_login(login);
        self.logins.iter().any(|l| *l == login)
    }

    /// Whether any of `logins` is the agent
    pub fn any_matches<S: AsRef<str>>(&self, logins: &[S]) -> bool {
        logins.iter().any(|l| self.matches(l.as_ref()))
    }

    /// Normalized logins
    pub fn logins(&self) -> &[String] {
        &self.logins
    }
}

fn normalize_login(login: &str) -> String {
    let lower = login.trim().to_lowercase();
    lower
        .strip_suffix("[bot]")
        .map_or_else(|| lower.clone(), ToString::to_string)
}

/// Time-window correlation settings for the resolution matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSettings {
    /// How long after the issue a request may be created and still match
    /// on WIP marker or sequence number
    pub window: chrono::Duration,
    /// Requests created more than this before the issue are discarded
    pub buffer: chrono::Duration,
    /// Number of recent requests fetched per lookup
    pub page_size: u8,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            window: chrono::Duration::hours(DEFAULT_MATCH_WINDOW_HOURS),
            buffer: chrono::Duration::minutes(DEFAULT_MATCH_BUFFER_MINUTES),
            page_size: DEFAULT_REQUEST_PAGE_SIZE,
        }
    }
}

/// Timing for the approve-then-merge protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    /// Pause between submitting the approval and re-checking readiness
    pub settle_delay: Duration,
    /// Interval between readiness re-checks
    pub retry_interval: Duration,
    /// Give up waiting for readiness after this long
    pub timeout: Duration,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(DEFAULT_MERGE_SETTLE_SECS),
            retry_interval: Duration::from_secs(DEFAULT_READINESS_RETRY_SECS),
            timeout: Duration::from_secs(DEFAULT_READINESS_TIMEOUT_SECS),
        }
    }
}

/// Settings that drive workflow decisions
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Label that marks issues created by this tool
    pub tracking_label: String,
    /// Who counts as the agent
    pub agent: AgentIdentity,
    /// Login assigned to every dispatched issue (None disables)
    pub agent_assignee: Option<String>,
    /// Additional assignees for dispatched issues
    pub extra_assignees: Vec<String>,
    /// Matcher windows
    pub matching: MatchSettings,
    /// Merge protocol timing
    pub merge: MergeSettings,
    /// Treat an issue closed without any closing request as done
    pub accept_manual_close: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            tracking_label: DEFAULT_LABEL.to_string(),
            agent: AgentIdentity::new(split_list(DEFAULT_AGENT_LOGINS)),
            agent_assignee: Some(DEFAULT_AGENT_ASSIGNEE.to_string()),
            extra_assignees: Vec::new(),
            matching: MatchSettings::default(),
            merge: MergeSettings::default(),
            accept_manual_close: true,
        }
    }
}

/// Full runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Tracker kind
    pub platform: Platform,
    /// API token
    pub token: String,
    /// API base URL, no trailing slash
    pub base_url: String,
    /// Repository owner / namespace
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Directory holding the numbered Markdown files
    pub issues_dir: PathBuf,
    /// Path of the JSON state file
    pub state_file: PathBuf,
    /// Sleep between cycles in continuous mode
    pub poll_interval: Duration,
    /// Decision settings
    pub workflow: WorkflowSettings,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let platform = match get("TRACKER_PLATFORM").as_deref() {
            None => Platform::GitHub,
            Some(value) => match value.to_lowercase().as_str() {
                "github" => Platform::GitHub,
                "gitlab" => Platform::GitLab,
                other => {
                    return Err(Error::Config(format!(
                        "TRACKER_PLATFORM must be 'github' or 'gitlab', got '{other}'"
                    )));
                }
            },
        };

        let (token_var, url_var, default_url) = match platform {
            Platform::GitHub => ("GITHUB_TOKEN", "GITHUB_URL", DEFAULT_GITHUB_URL),
            Platform::GitLab => ("GITLAB_TOKEN", "GITLAB_URL", DEFAULT_GITLAB_URL),
        };

        let token = get(token_var);
        let owner = get("REPO_OWNER");
        let repo = get("REPO_NAME");

        let missing: Vec<&str> = [
            (token_var, token.is_none()),
            ("REPO_OWNER", owner.is_none()),
            ("REPO_NAME", repo.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variable(s): {}",
                missing.join(", ")
            )));
        }

        let base_url = get(url_var).unwrap_or_else(|| default_url.to_string());
        url::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("{url_var} is not a valid URL ({base_url}): {e}")))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let poll_secs: u64 = parse_var(&get, "POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(Error::Config("POLL_INTERVAL must be at least 1".to_string()));
        }

        let window_hours: i64 = parse_var(&get, "MATCH_WINDOW_HOURS", DEFAULT_MATCH_WINDOW_HOURS)?;
        let buffer_minutes: i64 =
            parse_var(&get, "MATCH_BUFFER_MINUTES", DEFAULT_MATCH_BUFFER_MINUTES)?;
        if window_hours < 0 || buffer_minutes < 0 {
            return Err(Error::Config(
                "MATCH_WINDOW_HOURS and MATCH_BUFFER_MINUTES must not be negative".to_string(),
            ));
        }
        let page_size: u8 = parse_var(&get, "REQUEST_PAGE_SIZE", DEFAULT_REQUEST_PAGE_SIZE)?;
        if page_size == 0 || page_size > 100 {
            return Err(Error::Config(
                "REQUEST_PAGE_SIZE must be between 1 and 100".to_string(),
            ));
        }

        let merge = MergeSettings {
            settle_delay: Duration::from_secs(parse_var(
                &get,
                "MERGE_SETTLE_SECS",
                DEFAULT_MERGE_SETTLE_SECS,
            )?),
            retry_interval: Duration::from_secs(parse_var(
                &get,
                "READINESS_RETRY_SECS",
                DEFAULT_READINESS_RETRY_SECS,
            )?),
            timeout: Duration::from_secs(parse_var(
                &get,
                "READINESS_TIMEOUT_SECS",
                DEFAULT_READINESS_TIMEOUT_SECS,
            )?),
        };

        let accept_manual_close = match get("ACCEPT_MANUAL_CLOSE") {
            None => true,
            Some(value) => parse_bool(&value).ok_or_else(|| {
                Error::Config(format!("ACCEPT_MANUAL_CLOSE must be true or false, got '{value}'"))
            })?,
        };

        // An explicitly empty AGENT_ASSIGNEE disables agent assignment
        let agent_assignee = match lookup("AGENT_ASSIGNEE") {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.trim().to_string()),
            None => Some(DEFAULT_AGENT_ASSIGNEE.to_string()),
        };
        let mut agent_logins =
            split_list(&get("AGENT_LOGINS").unwrap_or_else(|| DEFAULT_AGENT_LOGINS.to_string()));
        if let Some(ref assignee) = agent_assignee {
            agent_logins.push(assignee.clone());
        }

        let workflow = WorkflowSettings {
            tracking_label: get("LABEL").unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            agent: AgentIdentity::new(agent_logins),
            agent_assignee,
            extra_assignees: get("ASSIGNEES").map(|v| split_list(&v)).unwrap_or_default(),
            matching: MatchSettings {
                window: chrono::Duration::hours(window_hours),
                buffer: chrono::Duration::minutes(buffer_minutes),
                page_size,
            },
            merge,
            accept_manual_close,
        };

        Ok(Self {
            platform,
            token: token.unwrap_or_default(),
            base_url,
            owner: owner.unwrap_or_default(),
            repo: repo.unwrap_or_default(),
            issues_dir: PathBuf::from(
                get("ISSUES_DIR").unwrap_or_else(|| DEFAULT_ISSUES_DIR.to_string()),
            ),
            state_file: PathBuf::from(
                get("STATE_FILE").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
            ),
            poll_interval: Duration::from_secs(poll_secs),
            workflow,
        })
    }

    /// Tracker connection details
    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            platform: self.platform,
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

fn parse_var<T, F>(get: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    get(name).map_or(Ok(default), |raw| {
        raw.parse::<T>()
            .map_err(|e| Error::Config(format!("{name} has invalid value '{raw}': {e}")))
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated list, dropping empty entries
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
