use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Partial document update: field name -> new value. A `null` value clears the field.
pub type FieldMap = serde_json::Map<String, Value>;

/// Anyone may join a public group.
pub const GROUP_TYPE_PUBLIC: i32 = 0;
/// Private groups are invitation-only.
pub const GROUP_TYPE_PRIVATE: i32 = 1;

/// Stable document field names shared with the remote store.
pub mod fields {
    pub const KEY: &str = "groupKey";
    pub const NAME: &str = "groupName";
    pub const ADMIN_KEY: &str = "adminKey";
    pub const FRIEND_KEYS: &str = "friendKeys";
    pub const COMING_KEYS: &str = "comingKeys";
    pub const MESSAGE_KEYS: &str = "messageKeys";
    pub const LOCATION: &str = "groupLocation";
    pub const DESCRIPTION: &str = "groupDescription";
    pub const DAY: &str = "groupDays";
    pub const MONTH: &str = "groupMonths";
    pub const YEAR: &str = "groupYears";
    pub const HOUR: &str = "groupHours";
    pub const MINUTE: &str = "groupMinutes";
    pub const PRICE: &str = "groupPrice";
    pub const TYPE: &str = "groupType";
    pub const CAN_ADD: &str = "canAdd";
    pub const CREATED_AT: &str = "createdAt";

    /// Presence-map fields, updated entry by entry rather than wholesale.
    pub const KEY_SETS: [&str; 3] = [FRIEND_KEYS, COMING_KEYS, MESSAGE_KEYS];

    /// Update path of one entry of a presence map, e.g. `friendKeys/bob`.
    pub fn entry_path(field: &str, key: &str) -> String {
        format!("{}/{}", field, key)
    }
}

/// Set of user keys stored as a presence map.
///
/// The remote store keeps sets as `{"userKey": true}` objects so that values
/// can later carry metadata. Iteration is ordered by key, which is what makes
/// admin replacement reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeySet(BTreeMap<String, Value>);

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Add a key; returns false if it was already present.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, Value::Bool(true));
        true
    }

    /// Remove a key; returns false if it was not present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.0.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in ascending order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for KeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = KeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// Firebase drops empty maps and sometimes returns `null` for them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn take_object(document: &mut FieldMap, field: &str) -> FieldMap {
    match document.remove(field) {
        Some(Value::Object(map)) => map,
        _ => FieldMap::new(),
    }
}

/// A party/event group as stored in the remote document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Group {
    #[serde(rename = "groupKey", default)]
    pub key: String,
    #[serde(rename = "groupName", default)]
    pub name: String,
    #[serde(rename = "adminKey", default)]
    pub admin_key: String,
    #[serde(rename = "friendKeys", alias = "FriendKeys", default, deserialize_with = "null_as_default")]
    #[cfg_attr(feature = "ts", ts(type = "Record<string, unknown>"))]
    pub friend_keys: KeySet,
    #[serde(rename = "comingKeys", alias = "ComingKeys", default, deserialize_with = "null_as_default")]
    #[cfg_attr(feature = "ts", ts(type = "Record<string, unknown>"))]
    pub coming_keys: KeySet,
    #[serde(rename = "messageKeys", alias = "MessageKeys", default, deserialize_with = "null_as_default")]
    #[cfg_attr(feature = "ts", ts(type = "Record<string, unknown>"))]
    pub message_keys: KeySet,
    #[serde(rename = "groupLocation", default)]
    pub location: Option<String>,
    #[serde(rename = "groupDescription", default)]
    pub description: Option<String>,
    #[serde(rename = "groupDays", default)]
    pub day: Option<String>,
    #[serde(rename = "groupMonths", default)]
    pub month: Option<String>,
    #[serde(rename = "groupYears", default)]
    pub year: Option<String>,
    #[serde(rename = "groupHours", default)]
    pub hour: Option<String>,
    #[serde(rename = "groupMinutes", default)]
    pub minute: Option<String>,
    #[serde(rename = "groupPrice", default)]
    pub price: Option<String>,
    #[serde(rename = "groupType", default)]
    pub group_type: i32,
    #[serde(rename = "canAdd", default)]
    pub can_add: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

impl Group {
    /// A fresh group whose only member is its admin.
    pub fn new(key: impl Into<String>, name: impl Into<String>, admin_key: impl Into<String>) -> Self {
        let admin_key = admin_key.into();
        Self {
            key: key.into(),
            name: name.into(),
            friend_keys: KeySet::from_iter([admin_key.clone()]),
            admin_key,
            created_at: Some(Utc::now().to_rfc3339()),
            ..Default::default()
        }
    }

    pub fn is_admin(&self, user_key: &str) -> bool {
        !self.admin_key.is_empty() && self.admin_key == user_key
    }

    pub fn is_member(&self, user_key: &str) -> bool {
        self.friend_keys.contains(user_key)
    }

    pub fn is_attending(&self, user_key: &str) -> bool {
        self.coming_keys.contains(user_key)
    }

    pub fn is_public(&self) -> bool {
        self.group_type == GROUP_TYPE_PUBLIC
    }

    /// Decode a remote document, filling in the key when the document omits it.
    pub fn from_document(key: &str, document: Value) -> serde_json::Result<Self> {
        let mut group: Group = serde_json::from_value(document)?;
        if group.key.is_empty() {
            group.key = key.to_string();
        }
        Ok(group)
    }

    pub fn to_document(&self) -> serde_json::Result<FieldMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "group serialized to non-object: {}",
                other
            ))),
        }
    }

    /// Update paths whose value differs between `self` and `next`, carrying
    /// the values from `next`.
    ///
    /// Scalar fields are reported whole. Presence maps are reported per entry
    /// (`friendKeys/bob: true` for an addition, `null` for a removal) so that
    /// entries added by other writers since `self` was read are left alone.
    pub fn changed_fields(&self, next: &Group) -> serde_json::Result<FieldMap> {
        let mut before = self.to_document()?;
        let mut after = next.to_document()?;
        let mut changed = FieldMap::new();

        for field in fields::KEY_SETS {
            let old = take_object(&mut before, field);
            let new = take_object(&mut after, field);
            for (key, value) in &new {
                if old.get(key) != Some(value) {
                    changed.insert(fields::entry_path(field, key), value.clone());
                }
            }
            for key in old.keys().filter(|key| !new.contains_key(*key)) {
                changed.insert(fields::entry_path(field, key), Value::Null);
            }
        }

        changed.extend(after.into_iter().filter(|(name, value)| before.get(name) != Some(value)));
        Ok(changed)
    }

    /// Event start time, when the schedule fields are complete.
    ///
    /// Hours may arrive as `"18"` with a separate minute field or as `"18:30"`.
    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        let day: u32 = self.day.as_deref()?.trim().parse().ok()?;
        let month: u32 = self.month.as_deref()?.trim().parse().ok()?;
        let year: i32 = self.year.as_deref()?.trim().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;

        let hour_field = self.hour.as_deref().unwrap_or("0").trim();
        let (hour, minute) = match hour_field.split_once(':') {
            Some((h, m)) => (h.parse().ok()?, m.parse().ok()?),
            None => {
                let minute = match self.minute.as_deref() {
                    Some(m) => m.trim().parse().ok()?,
                    None => 0,
                };
                (hour_field.parse().ok()?, minute)
            }
        };
        date.and_hms_opt(hour, minute, 0)
    }
}
