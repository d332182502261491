//! Record types stored in the film-assist database
//!
//! The initializer never reads or writes these records; they document the
//! field names the declared indexes cover and give downstream services a
//! typed view of the two collections.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

/// Field names referenced by the schema definitions
pub mod fields {
    pub const EMAIL: &str = "email";
    pub const USERNAME: &str = "username";
    pub const USER_ID: &str = "user_id";
    pub const CREATED_AT: &str = "created_at";
    pub const TITLE: &str = "title";
    pub const THEME: &str = "theme";
}

/// Subscription tier of a user account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

/// Processing state of a story
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Draft,
    Processing,
    Completed,
}

/// A record in the `users` collection
///
/// `email` and `username` are each unique across the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
}

fn default_true() -> bool {
    true
}

impl UserRecord {
    pub fn new(username: &str, email: &str, hashed_password: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            created_at: Utc::now(),
            is_active: true,
            subscription_tier: SubscriptionTier::Free,
        }
    }
}

/// One scene of a story
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_metadata: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_angle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A record in the `stories` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub theme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    /// Owning user; not enforced as a foreign key
    pub user_id: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: StoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_scenes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<f64>,
}

impl StoryRecord {
    pub fn new(user_id: &str, title: &str, theme: &str) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.to_string(),
            theme: theme.to_string(),
            genre: None,
            scenes: vec![],
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            status: StoryStatus::Draft,
            total_scenes: None,
            estimated_duration: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, Bson};

    #[test]
    fn test_user_record_fields() {
        let user = UserRecord::new("ana", "ana@example.com", "hash");
        let doc = bson::to_document(&user).unwrap();

        assert!(!doc.contains_key("_id"));
        assert_eq!(doc.get_str(fields::EMAIL).unwrap(), "ana@example.com");
        assert_eq!(doc.get_str(fields::USERNAME).unwrap(), "ana");
        assert_eq!(doc.get_str("subscription_tier").unwrap(), "free");
        assert!(matches!(doc.get(fields::CREATED_AT), Some(Bson::DateTime(_))));
    }

    #[test]
    fn test_story_record_defaults() {
        let doc = mongodb::bson::doc! {
            "title": "Night Train",
            "theme": "noir",
            "user_id": "u1",
            "created_at": bson::DateTime::now(),
            "updated_at": bson::DateTime::now(),
        };
        let story: StoryRecord = bson::from_document(doc).unwrap();

        assert_eq!(story.status, StoryStatus::Draft);
        assert!(story.scenes.is_empty());
        assert_eq!(story.genre, None);
        assert_eq!(story.user_id, "u1");
    }

    #[test]
    fn test_scene_skips_empty_options() {
        let scene = Scene {
            description: "Rain on the platform".to_string(),
            lens: Some("35mm".to_string()),
            ..Default::default()
        };
        let doc = bson::to_document(&scene).unwrap();

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get_str("lens").unwrap(), "35mm");
    }
}
