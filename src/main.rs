//! tatd - administration tool for the tat identity core.
//!
//! ```text
//! tatd <config.toml> check <user> [--fix-topics] [--fix-group]
//! tatd <config.toml> convert-system <admin> <user> [--notifications]
//! tatd <config.toml> reset-system <user>
//! tatd <config.toml> set-admin <admin> <user>
//! tatd <config.toml> archive <admin> <user>
//! tatd <config.toml> rename <user> <new-username>
//! tatd <config.toml> update <user> <fullname> <email>
//! tatd <config.toml> users
//! ```
//!
//! `--metrics` after any command prints the Prometheus text exposition of
//! the operations it ran.

use anyhow::{Context, bail};
use std::sync::Arc;
use tat_core::config::validation;
use tat_core::db::UserCriteria;
use tat_core::services::{BroadcastPublisher, Credentials, EffectQueue, LogMailer};
use tat_core::{Config, Database, Services};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: tatd <config.toml> <check|convert-system|reset-system|set-admin|archive|rename|update|users> [args] [--metrics]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, command, rest) = match args.as_slice() {
        [config_path, command, rest @ ..] => (config_path, command.as_str(), rest),
        _ => bail!(USAGE),
    };

    let config = Config::load(config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    tat_core::metrics::init();

    let db = Database::new(&config.database.path)
        .await
        .with_context(|| format!("opening database {}", config.database.path))?;

    let publisher = Arc::new(BroadcastPublisher::new(config.effects.queue_capacity));
    let (effects, worker) =
        EffectQueue::spawn(Arc::new(LogMailer), publisher, config.effects.queue_capacity);
    let services = Services::new(db, &config, effects);

    info!(command, "Running admin command");
    run(&services, command, rest).await?;
    if rest.iter().any(|a| a == "--metrics") {
        print!("{}", tat_core::metrics::gather_metrics());
    }

    // Dropping the last queue handle lets the worker drain and stop.
    drop(services);
    worker.await.context("effect worker panicked")?;
    Ok(())
}

async fn run(services: &Services, command: &str, args: &[String]) -> anyhow::Result<()> {
    let flag = |name: &str| args.iter().any(|a| a == name);
    let positional: Vec<&str> = args
        .iter()
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect();

    match (command, positional.as_slice()) {
        ("check", [user]) => {
            let report = services
                .checker
                .check(user, flag("--fix-topics"), flag("--fix-group"))
                .await?;
            println!("{}", report.topics_info());
            println!("{}", report.default_group);
        }
        ("convert-system", [admin, user]) => {
            let creds = services
                .lifecycle
                .convert_to_system(admin, user, flag("--notifications"))
                .await?;
            print_credentials(&creds);
        }
        ("reset-system", [user]) => {
            let creds = services.lifecycle.reset_system_user_password(user).await?;
            print_credentials(&creds);
        }
        ("set-admin", [admin, user]) => {
            services.lifecycle.convert_to_admin(admin, user).await?;
            println!("user {user} is now an admin");
        }
        ("archive", [admin, user]) => {
            services.lifecycle.archive(admin, user).await?;
            println!("user {user} archived");
        }
        ("rename", [user, new_username]) => {
            services.lifecycle.rename(user, new_username).await?;
            println!("user {user} renamed to {new_username}");
        }
        ("update", [user, fullname, email]) => {
            services.lifecycle.update(user, fullname, email).await?;
            println!("user {user} updated");
        }
        ("users", []) => {
            let criteria = UserCriteria {
                with_groups: true,
                ..Default::default()
            };
            let (count, users) = services.lifecycle.list(&criteria, true).await?;
            println!("{}", serde_json::to_string_pretty(&users)?);
            println!("{count} user(s)");
        }
        _ => bail!(USAGE),
    }
    Ok(())
}

fn print_credentials(creds: &Credentials) {
    println!("username: {}", creds.username);
    println!("password: {}", creds.password.expose());
    println!("url: {}", creds.url);
}
