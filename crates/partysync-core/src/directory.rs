//! Resolving membership keys to display identities.

use futures::future::join_all;
use tracing::debug;

use crate::models::{Group, KeySet, User};
use crate::remote::UserDirectory;

/// Members and attendees of a group, resolved through a `UserDirectory`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberRoster {
    pub admin: Option<User>,
    pub members: Vec<User>,
    pub attendees: Vec<User>,
    /// Keys the directory could not resolve
    pub unresolved: Vec<String>,
}

async fn resolve_keys(directory: &dyn UserDirectory, keys: &KeySet) -> (Vec<User>, Vec<String>) {
    let lookups = keys.iter().map(|key| async move { (key, directory.get_user(key).await) });
    let mut users = Vec::new();
    let mut unresolved = Vec::new();
    for (key, result) in join_all(lookups).await {
        match result {
            Ok(user) => users.push(user),
            Err(e) => {
                debug!(user = key, error = %e, "Could not resolve user");
                unresolved.push(key.to_string());
            }
        }
    }
    users.sort_by_key(|user| user.display_name().to_lowercase());
    (users, unresolved)
}

pub async fn resolve_roster(directory: &dyn UserDirectory, group: &Group) -> MemberRoster {
    let (members, mut unresolved) = resolve_keys(directory, &group.friend_keys).await;
    let (attendees, missing_attendees) = resolve_keys(directory, &group.coming_keys).await;
    for key in missing_attendees {
        if !unresolved.contains(&key) {
            unresolved.push(key);
        }
    }
    let admin = members.iter().find(|user| user.key == group.admin_key).cloned();
    MemberRoster {
        admin,
        members,
        attendees,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemoteStore;

    fn user(key: &str, name: &str) -> User {
        User {
            key: key.to_string(),
            username: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_roster() {
        let directory = MemoryRemoteStore::new();
        directory.insert_user(user("alice", "Alice"));
        directory.insert_user(user("bob", "bob"));

        let mut group = Group::new("G1", "Party", "alice");
        group.friend_keys.insert("bob");
        group.friend_keys.insert("ghost");
        group.coming_keys.insert("bob");

        let roster = resolve_roster(&directory, &group).await;
        assert_eq!(roster.admin.as_ref().map(|u| u.key.as_str()), Some("alice"));
        assert_eq!(
            roster.members.iter().map(|u| u.key.as_str()).collect::<Vec<_>>(),
            vec!["alice", "bob"]
        );
        assert_eq!(roster.attendees.len(), 1);
        assert_eq!(roster.unresolved, vec!["ghost".to_string()]);
    }
}
