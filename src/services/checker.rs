//! Self-repair of a user's private topics and default group membership.

use super::lifecycle::{UserLifecycleManager, private_topic_paths};
use super::{load_user, observe};
use crate::config::AccountsConfig;
use crate::db::Database;
use crate::error::ServiceResult;
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of one check run. Sub-check failures are reported in the text,
/// never as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// `(path, status)` for each canonical private topic.
    pub topics: Vec<(String, String)>,
    pub default_group: String,
}

impl CheckReport {
    /// One line per private topic, `path: status`.
    pub fn topics_info(&self) -> String {
        self.topics
            .iter()
            .map(|(path, status)| format!("{path}: {status}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns true when every private topic reported `OK`.
    pub fn topics_ok(&self) -> bool {
        self.topics.iter().all(|(_, status)| status == "OK")
    }
}

/// Idempotent consistency pass over one user.
#[derive(Clone)]
pub struct ConsistencyChecker {
    db: Database,
    accounts: AccountsConfig,
    lifecycle: UserLifecycleManager,
}

impl ConsistencyChecker {
    pub fn new(db: Database, accounts: AccountsConfig, lifecycle: UserLifecycleManager) -> Self {
        Self {
            db,
            accounts,
            lifecycle,
        }
    }

    /// Check `username`, optionally creating missing private topics and
    /// joining the default group.
    ///
    /// Only an unknown user fails the call.
    pub async fn check(
        &self,
        username: &str,
        fix_private_topics: bool,
        fix_default_group: bool,
    ) -> ServiceResult<CheckReport> {
        observe("check_user", username, None, async {
            let user = load_user(&self.db, username).await?;

            let mut topics = Vec::with_capacity(4);
            for path in private_topic_paths(&user.username) {
                let status = self.check_topic(&user.username, &path, fix_private_topics).await;
                topics.push((path, status));
            }

            let default_group = self.check_group(&user.username, fix_default_group).await;

            let report = CheckReport {
                topics,
                default_group,
            };
            info!(username = %user.username, topics_ok = report.topics_ok(), group = %report.default_group, "User checked");
            Ok(report)
        })
        .await
    }

    async fn check_topic(&self, username: &str, path: &str, fix: bool) -> String {
        match self.db.topics().find_by_path(path).await {
            Ok(Some(_)) => "OK".to_string(),
            Ok(None) if fix => match self.lifecycle.create_private_topic(username, path).await {
                Ok(_) => "created".to_string(),
                Err(e) => {
                    warn!(username, path, error = %e, "Private topic repair failed");
                    format!("KO: {e}")
                }
            },
            Ok(None) => "KO: not exist".to_string(),
            Err(e) => {
                warn!(username, path, error = %e, "Private topic lookup failed");
                "KO: lookup failed".to_string()
            }
        }
    }

    async fn check_group(&self, username: &str, fix: bool) -> String {
        let Some(group) = self.accounts.default_group() else {
            return "no default group configured".to_string();
        };

        let groups = match self.db.groups().groups_of(username).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(username, error = %e, "Group lookup failed");
                return format!("user in default group {group} KO: lookup failed");
            }
        };

        if groups.contains(group) {
            format!("user in {group} OK")
        } else if !fix {
            format!("user in default group {group} KO")
        } else {
            match self.db.groups().add_member(group, username).await {
                Ok(_) => format!("user added to default group {group}"),
                Err(e) => {
                    warn!(username, group, error = %e, "Default group repair failed");
                    format!("user in default group {group} KO: {e}")
                }
            }
        }
    }
}
