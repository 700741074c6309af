//! Authentication data models

use serde::{Deserialize, Serialize};

use crate::accounts::Account;

/// JWT claims structure
#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Response of `GET /api/me`
#[derive(Serialize, Debug)]
pub struct MeResponse {
    pub user: Account,
    pub is_admin: bool,
}
