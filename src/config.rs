use crate::services::{
    bucket_service::{PROJECT_NAME_MIN_LEN, max_project_len},
    reconciler::DEFAULT_PAGE_SIZE,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::{env, fmt::Display, str::FromStr};

const ENV_PREFIX: &str = "BUCKET_WARDEN_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; CLI wins.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Prefix of every generated bucket name.
    pub environment: String,
    pub region: String,
    pub super_admin_emails: Vec<String>,
    pub super_admin_group: String,
    pub business_admin_group: String,
    pub scan_page_size: usize,
    /// Append notifications to this JSON-lines file instead of the log.
    pub notification_log: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Self-healing bucket provisioning service")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Host to bind to (overrides BUCKET_WARDEN_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_WARDEN_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Root directory of the bucket backend (overrides BUCKET_WARDEN_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides BUCKET_WARDEN_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Bucket name prefix (overrides BUCKET_WARDEN_ENVIRONMENT)
    #[arg(long, global = true)]
    pub environment: Option<String>,

    /// Region buckets are created in (overrides BUCKET_WARDEN_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Comma-separated super-admin identities (overrides BUCKET_WARDEN_SUPER_ADMIN_EMAILS)
    #[arg(long, global = true)]
    pub super_admin_emails: Option<String>,

    /// Group granting super-admin (overrides BUCKET_WARDEN_SUPER_ADMIN_GROUP)
    #[arg(long, global = true)]
    pub super_admin_group: Option<String>,

    /// Group granting business-admin (overrides BUCKET_WARDEN_BUSINESS_ADMIN_GROUP)
    #[arg(long, global = true)]
    pub business_admin_group: Option<String>,

    /// Records loaded per reconciliation page (overrides BUCKET_WARDEN_SCAN_PAGE_SIZE)
    #[arg(long, global = true)]
    pub scan_page_size: Option<usize>,

    /// JSON-lines notification file (overrides BUCKET_WARDEN_NOTIFICATION_LOG)
    #[arg(long, global = true)]
    pub notification_log: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq, Default)]
pub enum Command {
    /// Run the HTTP API (default)
    #[default]
    Serve,
    /// Run one reconciliation sweep and exit
    Reconcile,
    /// Run migrations and exit
    Migrate,
    /// Print deletion history as JSON
    Audit {
        /// Only the record behind this bucket
        #[arg(long)]
        resource_name: Option<String>,
        /// Every owner's record for this project name
        #[arg(long, short = 'p', conflicts_with = "resource_name")]
        project: Option<String>,
    },
    /// Manage admin group memberships
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum GroupAction {
    Add { identity: String, group: String },
    Remove { identity: String, group: String },
    List { group: String },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        Self::from_sources(args, |key| env::var(key).ok())
    }

    /// Merge parsed arguments with variables read through `lookup`.
    pub fn from_sources(
        args: Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, Command)> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let super_admin_emails = args
            .super_admin_emails
            .or_else(|| var("SUPER_ADMIN_EMAILS"))
            .map(|list| split_list(&list))
            .unwrap_or_default();

        let cfg = Self {
            host: args
                .host
                .or_else(|| var("HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: match args.port {
                Some(port) => port,
                None => parse_var(&var, "PORT", 3000)?,
            },
            storage_dir: args
                .storage_dir
                .or_else(|| var("STORAGE_DIR"))
                .unwrap_or_else(|| "./data/buckets".into()),
            database_url: args
                .database_url
                .or_else(|| var("DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/bucket_warden.db".into()),
            environment: args
                .environment
                .or_else(|| var("ENVIRONMENT"))
                .unwrap_or_else(|| "dev".into()),
            region: args
                .region
                .or_else(|| var("REGION"))
                .unwrap_or_else(|| "us-east-1".into()),
            super_admin_emails,
            super_admin_group: args
                .super_admin_group
                .or_else(|| var("SUPER_ADMIN_GROUP"))
                .unwrap_or_else(|| "admins".into()),
            business_admin_group: args
                .business_admin_group
                .or_else(|| var("BUSINESS_ADMIN_GROUP"))
                .unwrap_or_else(|| "business-admins".into()),
            scan_page_size: match args.scan_page_size {
                Some(size) => size,
                None => parse_var(&var, "SCAN_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            },
            notification_log: args.notification_log.or_else(|| var("NOTIFICATION_LOG")),
        };

        if cfg.scan_page_size == 0 {
            bail!("scan page size must be at least 1");
        }
        ensure_environment_valid(&cfg.environment)?;

        Ok((cfg, args.command.unwrap_or_default()))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{err}"))
            .with_context(|| format!("parsing {ENV_PREFIX}{name} value `{value}`")),
        None => Ok(default),
    }
}

/// The environment prefixes every bucket name, so it must be a legal name
/// fragment that leaves room for a minimal project name.
fn ensure_environment_valid(environment: &str) -> Result<()> {
    let well_formed = !environment.is_empty()
        && !environment.starts_with('-')
        && environment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !well_formed {
        bail!("environment `{environment}` must be lowercase letters, digits, and hyphens");
    }
    if max_project_len(environment) < PROJECT_NAME_MIN_LEN {
        bail!("environment `{environment}` leaves no room for a project name");
    }
    Ok(())
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_arguments_or_environment() {
        let (cfg, command) = AppConfig::from_sources(Args::default(), lookup(&[])).unwrap();
        assert_eq!(command, Command::Serve);
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.environment, "dev");
        assert_eq!(cfg.super_admin_group, "admins");
        assert_eq!(cfg.business_admin_group, "business-admins");
        assert_eq!(cfg.scan_page_size, 100);
        assert!(cfg.super_admin_emails.is_empty());
        assert_eq!(cfg.notification_log, None);
    }

    #[test]
    fn cli_wins_over_environment() {
        let args = Args::parse_from([
            "bucket-warden",
            "--port",
            "8080",
            "reconcile",
            "--environment",
            "prod",
        ]);
        let env = lookup(&[
            ("BUCKET_WARDEN_PORT", "9000"),
            ("BUCKET_WARDEN_ENVIRONMENT", "staging"),
            ("BUCKET_WARDEN_SUPER_ADMIN_EMAILS", "root@example.com, ,ops@example.com"),
        ]);
        let (cfg, command) = AppConfig::from_sources(args, env).unwrap();
        assert_eq!(command, Command::Reconcile);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.environment, "prod");
        assert_eq!(cfg.super_admin_emails, vec!["root@example.com", "ops@example.com"]);
    }

    #[test]
    fn malformed_numbers_are_reported() {
        let err = AppConfig::from_sources(
            Args::default(),
            lookup(&[("BUCKET_WARDEN_PORT", "eighty")]),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("BUCKET_WARDEN_PORT"));

        assert!(
            AppConfig::from_sources(
                Args::default(),
                lookup(&[("BUCKET_WARDEN_SCAN_PAGE_SIZE", "0")]),
            )
            .is_err()
        );
    }

    #[test]
    fn environment_must_fit_in_a_bucket_name() {
        let too_long = "e".repeat(51);
        for bad in ["", "Prod", "-dev", "qa_1", too_long.as_str()] {
            let env = lookup(&[("BUCKET_WARDEN_ENVIRONMENT", bad)]);
            assert!(
                AppConfig::from_sources(Args::default(), env).is_err(),
                "{bad:?} should be rejected"
            );
        }
        let env = lookup(&[("BUCKET_WARDEN_ENVIRONMENT", "staging")]);
        assert!(AppConfig::from_sources(Args::default(), env).is_ok());
    }

    #[test]
    fn subcommands_parse() {
        let args = Args::parse_from(["bucket-warden", "audit", "--resource-name", "dev-a-1"]);
        assert_eq!(
            args.command,
            Some(Command::Audit {
                resource_name: Some("dev-a-1".into()),
                project: None,
            })
        );

        let args = Args::parse_from(["bucket-warden", "audit", "-p", "team-alpha"]);
        assert_eq!(
            args.command,
            Some(Command::Audit {
                resource_name: None,
                project: Some("team-alpha".into()),
            })
        );
        assert!(
            Args::try_parse_from(["bucket-warden", "audit", "--resource-name", "x", "-p", "y"])
                .is_err()
        );

        let args = Args::parse_from(["bucket-warden", "group", "add", "ops@example.com", "admins"]);
        assert_eq!(
            args.command,
            Some(Command::Group {
                action: GroupAction::Add {
                    identity: "ops@example.com".into(),
                    group: "admins".into(),
                }
            })
        );
    }
}
