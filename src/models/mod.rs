use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub drive_refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A document's content is an opaque JSON tree owned by the editor frontend.
///
/// `share_token` is non-null exactly when `is_public` is true; the sharing
/// endpoints maintain that pairing atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: serde_json::Value,
    pub is_public: bool,
    pub share_token: Option<String>,
    pub copied_from_id: Option<String>,
    pub drive_file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationType {
    Article,
    ExerciseList,
    StudyMaterial,
    Proof,
}

impl PublicationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationType::Article => "article",
            PublicationType::ExerciseList => "exercise_list",
            PublicationType::StudyMaterial => "study_material",
            PublicationType::Proof => "proof",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "article" => Some(PublicationType::Article),
            "exercise_list" => Some(PublicationType::ExerciseList),
            "study_material" => Some(PublicationType::StudyMaterial),
            "proof" => Some(PublicationType::Proof),
            _ => None,
        }
    }
}

/// A published PDF. Always public: the share token is assigned at creation
/// and there is no reveal/hide mutation.
///
/// `like_count` and `comment_count` are denormalized; the store updates them
/// in the same transaction as the child-row mutation so they always equal the
/// true cardinality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    pub author_id: String,
    pub document_id: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(rename = "type")]
    pub pub_type: PublicationType,
    #[serde(skip_serializing)]
    pub pdf_path: String,
    #[serde(skip_serializing)]
    pub thumbnail_path: String,
    pub share_token: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationComment {
    pub id: String,
    pub publication_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ==================== Request types ====================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct DocumentCreate {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_content")]
    pub content: serde_json::Value,
}

fn default_title() -> String {
    "Untitled".to_string()
}

fn default_content() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct PublicationCreate {
    pub title: String,
    #[serde(rename = "type")]
    pub pub_type: PublicationType,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub document_id: Option<String>,
    pub pdf_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentCreate {
    pub content: String,
    pub parent_id: Option<String>,
}

/// `cursor` is the RFC3339 `created_at` of the last row seen, an exclusive
/// bound. `limit` is caller-supplied; the current design applies no
/// server-side cap.
#[derive(Debug, Deserialize)]
pub struct CursorQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

// ==================== Response types ====================

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentListItem {
    pub id: String,
    pub title: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub share_token: String,
    pub share_url: String,
}

/// A publication as seen by an authenticated reader: joined author name plus
/// the batch-computed `liked_by_me` flag.
#[derive(Debug, Serialize)]
pub struct PublicationView {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub document_id: Option<String>,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(rename = "type")]
    pub pub_type: PublicationType,
    pub share_token: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub liked_by_me: bool,
}

/// The unauthenticated share-link view. No author id, no storage paths.
#[derive(Debug, Serialize)]
pub struct PublicPublicationView {
    pub id: String,
    pub author_name: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(rename = "type")]
    pub pub_type: PublicationType,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: String,
    pub publication_id: String,
    pub author_id: String,
    pub author_name: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LikeToggleResponse {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Serialize)]
pub struct FollowToggleResponse {
    pub following: bool,
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub publication_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    pub is_following: bool,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
}
