use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{RemoteError, RemoteStore, UserDirectory};
use crate::models::{FieldMap, Group, User};

/// In-process authoritative store.
///
/// Documents are kept as JSON objects so partial updates behave like the
/// real document server: named fields are replaced, `null` removes a field,
/// everything else is untouched. A slash path such as `friendKeys/bob`
/// addresses one child of a nested object; an object left empty by a
/// removal disappears.
#[derive(Default)]
pub struct MemoryRemoteStore {
    groups: Mutex<HashMap<String, FieldMap>>,
    users: Mutex<HashMap<String, User>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn groups(&self) -> MutexGuard<'_, HashMap<String, FieldMap>> {
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn users(&self) -> MutexGuard<'_, HashMap<String, User>> {
        self.users.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_group(&self, group: &Group) -> Result<(), RemoteError> {
        let document = group
            .to_document()
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        self.groups().insert(group.key.clone(), document);
        Ok(())
    }

    pub fn insert_user(&self, user: User) {
        self.users().insert(user.key.clone(), user);
    }

    /// Current authoritative value, bypassing the async interface
    pub fn group(&self, key: &str) -> Option<Group> {
        let document = self.groups().get(key).cloned()?;
        Group::from_document(key, Value::Object(document)).ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.groups().contains_key(key)
    }
}

fn apply_path(document: &mut FieldMap, path: &str, value: Value) {
    let Some((field, rest)) = path.split_once('/') else {
        if value.is_null() {
            document.remove(path);
        } else {
            document.insert(path.to_string(), value);
        }
        return;
    };

    let child = document
        .entry(field)
        .or_insert_with(|| Value::Object(FieldMap::new()));
    if !child.is_object() {
        *child = Value::Object(FieldMap::new());
    }
    let now_empty = match child {
        Value::Object(map) => {
            apply_path(map, rest, value);
            map.is_empty()
        }
        _ => false,
    };
    if now_empty {
        document.remove(field);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, key: &str) -> Result<Option<Group>, RemoteError> {
        let Some(document) = self.groups().get(key).cloned() else {
            return Ok(None);
        };
        Group::from_document(key, Value::Object(document))
            .map(Some)
            .map_err(|e| RemoteError::Rejected(format!("corrupt document {}: {}", key, e)))
    }

    async fn fetch_all(&self) -> Result<Vec<Group>, RemoteError> {
        self.groups()
            .iter()
            .map(|(key, document)| {
                Group::from_document(key, Value::Object(document.clone()))
                    .map_err(|e| RemoteError::Rejected(format!("corrupt document {}: {}", key, e)))
            })
            .collect()
    }

    async fn update(&self, key: &str, fields: FieldMap) -> Result<(), RemoteError> {
        let mut groups = self.groups();
        let document = groups
            .get_mut(key)
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))?;
        for (path, value) in fields {
            apply_path(document, &path, value);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RemoteError> {
        match self.groups().remove(key) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(key.to_string())),
        }
    }

    async fn save(&self, _key: &str, group: &Group) -> Result<(), RemoteError> {
        self.insert_group(group)
    }
}

#[async_trait]
impl UserDirectory for MemoryRemoteStore {
    async fn list_users(&self) -> Result<Vec<User>, RemoteError> {
        let mut users: Vec<User> = self.users().values().cloned().collect();
        users.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(users)
    }

    async fn get_user(&self, key: &str) -> Result<User, RemoteError> {
        self.users()
            .get(key)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fields;
    use serde_json::json;

    #[tokio::test]
    async fn test_partial_update_touches_only_named_fields() {
        let store = MemoryRemoteStore::new();
        let mut group = Group::new("G1", "Party", "alice");
        group.location = Some("Park".into());
        store.insert_group(&group).unwrap();

        let mut fields = FieldMap::new();
        fields.insert(fields::FRIEND_KEYS.into(), json!({"alice": true, "bob": true}));
        store.update("G1", fields).await.unwrap();

        let stored = store.fetch("G1").await.unwrap().unwrap();
        assert!(stored.is_member("bob"));
        assert_eq!(stored.location.as_deref(), Some("Park"));
        assert_eq!(stored.name, "Party");
    }

    #[tokio::test]
    async fn test_null_clears_field() {
        let store = MemoryRemoteStore::new();
        let mut group = Group::new("G1", "Party", "alice");
        group.location = Some("Park".into());
        store.insert_group(&group).unwrap();

        let mut fields = FieldMap::new();
        fields.insert(fields::LOCATION.into(), Value::Null);
        store.update("G1", fields).await.unwrap();
        assert!(store.group("G1").unwrap().location.is_none());
    }

    #[tokio::test]
    async fn test_entry_paths_leave_other_entries() {
        let store = MemoryRemoteStore::new();
        let mut group = Group::new("G1", "Party", "alice");
        group.friend_keys.insert("dave");
        store.insert_group(&group).unwrap();

        let mut fields = FieldMap::new();
        fields.insert("friendKeys/carol".into(), json!(true));
        fields.insert("friendKeys/alice".into(), Value::Null);
        fields.insert("comingKeys/carol".into(), json!(true));
        store.update("G1", fields).await.unwrap();

        let stored = store.group("G1").unwrap();
        assert_eq!(stored.friend_keys.iter().collect::<Vec<_>>(), vec!["carol", "dave"]);
        assert!(stored.is_attending("carol"));

        let mut fields = FieldMap::new();
        fields.insert("comingKeys/carol".into(), Value::Null);
        store.update("G1", fields).await.unwrap();
        assert!(store.group("G1").unwrap().coming_keys.is_empty());
    }

    #[tokio::test]
    async fn test_missing_document() {
        let store = MemoryRemoteStore::new();
        assert_eq!(store.fetch("nope").await, Ok(None));
        assert_eq!(
            store.update("nope", FieldMap::new()).await,
            Err(RemoteError::NotFound("nope".into()))
        );
        assert_eq!(store.delete("nope").await, Err(RemoteError::NotFound("nope".into())));
    }

    #[tokio::test]
    async fn test_user_directory() {
        let store = MemoryRemoteStore::new();
        store.insert_user(User { key: "u2".into(), ..Default::default() });
        store.insert_user(User { key: "u1".into(), username: Some("Dana".into()), ..Default::default() });

        let users = store.list_users().await.unwrap();
        assert_eq!(users.iter().map(|u| u.key.as_str()).collect::<Vec<_>>(), vec!["u1", "u2"]);
        assert_eq!(store.get_user("u1").await.unwrap().display_name(), "Dana");
        assert!(store.get_user("u3").await.is_err());
    }
}
