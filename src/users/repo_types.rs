use serde::Serialize;
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Free-form profile fields supplied at registration.
pub type Profile = serde_json::Map<String, serde_json::Value>;

/// Keys owned by the record itself; they never live inside the profile.
pub const RESERVED_KEYS: &[&str] = &["id", "email", "rollNo", "password", "createdAt", "updatedAt"];

/// User record as stored.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub roll_no: String,
    pub password_hash: String,
    pub profile: Json<Profile>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// User record as returned to callers. The digest is never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub roll_no: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            email: r.email,
            roll_no: r.roll_no,
            password_hash: r.password_hash,
            profile: r.profile.0,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Fields for a record about to be inserted; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub roll_no: String,
    pub password_hash: String,
    pub profile: Profile,
}

/// Partial update. `None` keeps the stored value, profile keys are merged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub roll_no: Option<String>,
    pub password_hash: Option<String>,
    pub profile: Profile,
}

/// Drops keys that would shadow record fields once flattened into JSON.
pub fn sanitize_profile(mut profile: Profile) -> Profile {
    profile.retain(|k, _| !RESERVED_KEYS.contains(&k.as_str()));
    profile
}
