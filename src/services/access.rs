//! Topic read/write access decisions.
//!
//! Access is a pure function of the topic ACLs, the user's identity and
//! groups, private-topic ownership and the configured [`AccessPolicy`].
//! Callers resolve the topic first and report a missing topic themselves.

use crate::config::AccessPolicy;
use crate::db::{Topic, User};

/// Root of the private tree owned by `username`.
pub fn private_root(username: &str) -> String {
    format!("/Private/{username}")
}

/// Returns true if `path` is `/Private/<username>` or lies below it.
pub fn is_private_owner(path: &str, username: &str) -> bool {
    path.strip_prefix("/Private/")
        .and_then(|rest| rest.strip_prefix(username))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Evaluates topic ACLs for a user.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicAccessGuard {
    policy: AccessPolicy,
}

impl TopicAccessGuard {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }

    /// Read access: any read or write grant, by name or by group.
    pub fn has_read_access(&self, topic: &Topic, user: &User) -> bool {
        if (user.is_admin && self.policy.admin_read_all)
            || (user.is_system && self.policy.system_read_all)
        {
            return true;
        }
        if self.has_write_access(topic, user) {
            return true;
        }
        topic.read_users.contains(&user.username)
            || !topic.read_groups.is_disjoint(&user.groups)
    }

    /// Write access: a write grant by name or by group, or ownership.
    pub fn has_write_access(&self, topic: &Topic, user: &User) -> bool {
        if user.is_admin && self.policy.admin_write_all {
            return true;
        }
        is_private_owner(&topic.path, &user.username)
            || topic.write_users.contains(&user.username)
            || !topic.write_groups.is_disjoint(&user.groups)
    }
}
