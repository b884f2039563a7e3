use serde::{Deserialize, Serialize};

use crate::users::repo_types::{Profile, User};

/// Request body for sign-up. Unknown fields are kept as profile fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub roll_no: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: Profile,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Partial update addressed by roll number.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub email: Option<String>,
    pub roll_no: Option<String>,
    pub password: Option<String>,
    #[serde(flatten)]
    pub profile: Profile,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: User,
}

/// Token is returned in the body as well as the cookie for non-browser clients.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub user: User,
    pub token: String,
}
