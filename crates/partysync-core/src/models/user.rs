use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct User {
    #[serde(rename = "userKey", default)]
    pub key: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "profileImageUrl", default)]
    pub profile_image_url: Option<String>,
}

impl User {
    /// Username if set, else email, else the raw key
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = User {
            key: "u1".to_string(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "u1");

        user.email = Some("dana@example.com".to_string());
        assert_eq!(user.display_name(), "dana@example.com");

        user.username = Some("  ".to_string());
        assert_eq!(user.display_name(), "dana@example.com");

        user.username = Some("Dana".to_string());
        assert_eq!(user.display_name(), "Dana");
    }

    #[test]
    fn test_parse_user() {
        let json = r#"{"userKey":"u1","username":"Dana","email":"dana@example.com","friendKeys":{"u2":true}}"#;
        let user: User = serde_json::from_str(json).expect("parse user");
        assert_eq!(user.key, "u1");
        assert_eq!(user.display_name(), "Dana");
        assert!(user.profile_image_url.is_none());
    }
}
