//! partysync - command-line access to PartyMaker groups.
//!
//! Reads go through the local snapshot cache; every membership change is
//! validated locally and committed to the document server before returning.

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use partysync_core::config::ENV_USER;
use partysync_core::models::{GROUP_TYPE_PRIVATE, GROUP_TYPE_PUBLIC};
use partysync_core::{
    resolve_roster, ApiClient, CacheManager, Config, Group, GroupDetails, GroupList, MutationOutcome, SyncCoordinator,
};

/// partysync - PartyMaker group membership from the command line
#[derive(Parser)]
#[command(name = "partysync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Acting user key (overrides `current_user` in the config file)
    #[arg(short, long, global = true, env = ENV_USER)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a group (cached unless stale or --refresh)
    Show {
        group: String,
        #[arg(long)]
        refresh: bool,
    },

    /// List members and attendees
    Members { group: String },

    /// List groups, or only the acting user's groups with --mine
    Groups {
        #[arg(long)]
        mine: bool,
        #[arg(long)]
        refresh: bool,
    },

    /// Create a group administered by the acting user
    Create {
        group: String,
        name: String,
        #[arg(long)]
        private: bool,
    },

    /// Add a user to a group
    Invite { group: String, user: String },

    /// Join a group as the acting user
    Join { group: String },

    /// Confirm attendance
    Attend { group: String },

    /// Withdraw attendance
    Unattend { group: String },

    /// Leave a group (an admin hands over to the next member)
    Leave { group: String },

    /// Remove a member (admin only)
    Remove { group: String, user: String },

    /// Update group details (admin only), e.g. '{"location":"Pier 39"}'
    Details { group: String, json: String },

    /// Delete a group (admin only)
    Delete { group: String },

    /// Drop every cached group snapshot
    ClearCache,
}

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (default `warn`). When `log_file` is set, the
/// same events are also appended there without ANSI colors.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path.file_name().unwrap_or(path.as_os_str());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    let _log_guard = init_tracing(config.log_file.as_deref());

    if let Some(user) = cli.user.filter(|u| !u.trim().is_empty()) {
        config.current_user = Some(user);
    }

    let cache = if config.persist_cache {
        Arc::new(CacheManager::new(config.cache_dir()?)?)
    } else {
        Arc::new(CacheManager::in_memory())
    };
    if let Commands::ClearCache = cli.command {
        cache.clear();
        println!("Cache cleared");
        return Ok(());
    }

    let api = Arc::new(ApiClient::new(&config.server_url, config.request_timeout())?);
    let sync = SyncCoordinator::new(api.clone(), cache, config.staleness_policy());
    info!(server = %config.server_url, "partysync starting");

    run(&config, &api, &sync, cli.command).await
}

fn current_user(config: &Config) -> Result<&str> {
    config
        .current_user
        .as_deref()
        .ok_or_else(|| anyhow!("No acting user: pass --user (or PARTYSYNC_USER) or set current_user in the config file"))
}

fn print_group(group: &Group) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(group)?);
    Ok(())
}

fn print_outcome(key: &str, outcome: &MutationOutcome) -> Result<()> {
    match outcome {
        MutationOutcome::Updated(group) => print_group(group),
        MutationOutcome::Deleted => {
            println!("Group {} deleted", key);
            Ok(())
        }
    }
}

fn print_list(list: &GroupList) {
    if let Some(err) = list.warning() {
        warn!(error = %err, "Listing cached groups");
        eprintln!("Warning: server unreachable, listing cached groups ({})", err);
    }
    for group in &list.groups {
        println!("{:<28} {:<32} {} members", group.key, group.name, group.friend_keys.len());
    }
}

async fn run(config: &Config, api: &ApiClient, sync: &SyncCoordinator, command: Commands) -> Result<()> {
    let (key, outcome) = match command {
        Commands::Show { group, refresh } => {
            let read = sync.read(&group, refresh).await?;
            if let Some(err) = read.warning() {
                warn!(key = %group, error = %err, "Showing cached copy");
                eprintln!("Warning: server unreachable, showing cached copy ({})", err);
            }
            return print_group(&read.group);
        }
        Commands::Members { group } => {
            let read = sync.read(&group, false).await?;
            let roster = resolve_roster(api, &read.group).await;
            for user in &roster.members {
                let mut tags = Vec::new();
                if read.group.is_admin(&user.key) {
                    tags.push("admin");
                }
                if read.group.is_attending(&user.key) {
                    tags.push("coming");
                }
                println!("{:<24} {:<28} {}", user.display_name(), user.key, tags.join(","));
            }
            for missing in &roster.unresolved {
                println!("{:<24} {:<28} unresolved", "?", missing);
            }
            return Ok(());
        }
        Commands::Groups { mine, refresh } => {
            let list = if mine {
                sync.list_user_groups(current_user(config)?, refresh).await?
            } else {
                sync.list_groups(refresh).await?
            };
            print_list(&list);
            return Ok(());
        }
        Commands::Create { group, name, private } => {
            let mut new_group = Group::new(group, name, current_user(config)?);
            new_group.group_type = if private { GROUP_TYPE_PRIVATE } else { GROUP_TYPE_PUBLIC };
            let created = sync.create_group(new_group).await?;
            return print_group(&created);
        }
        Commands::Invite { group, user } => {
            let outcome = sync.invite(&group, &user).await?;
            (group, outcome)
        }
        Commands::Join { group } => {
            let outcome = sync.join(&group, current_user(config)?).await?;
            (group, outcome)
        }
        Commands::Attend { group } => {
            let outcome = sync.set_attendance(&group, current_user(config)?, true).await?;
            (group, outcome)
        }
        Commands::Unattend { group } => {
            let outcome = sync.set_attendance(&group, current_user(config)?, false).await?;
            (group, outcome)
        }
        Commands::Leave { group } => {
            let outcome = sync.leave(&group, current_user(config)?).await?;
            (group, outcome)
        }
        Commands::Remove { group, user } => {
            let outcome = sync.remove_member(&group, current_user(config)?, &user).await?;
            (group, outcome)
        }
        Commands::Details { group, json } => {
            let details: GroupDetails = serde_json::from_str(&json).context("Invalid details JSON")?;
            let outcome = sync.update_details(&group, current_user(config)?, details).await?;
            (group, outcome)
        }
        Commands::Delete { group } => {
            let outcome = sync.delete_group(&group, current_user(config)?).await?;
            (group, outcome)
        }
        Commands::ClearCache => return Ok(()),
    };
    print_outcome(&key, &outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_remove() {
        let cli = Cli::try_parse_from(["partysync", "--user", "alice", "remove", "G1", "bob"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert!(matches!(cli.command, Commands::Remove { group, user } if group == "G1" && user == "bob"));
    }

    #[test]
    fn test_missing_argument_is_rejected() {
        assert!(Cli::try_parse_from(["partysync", "invite", "G1"]).is_err());
    }
}
