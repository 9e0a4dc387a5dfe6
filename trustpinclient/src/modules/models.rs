use serde::{Deserialize, Serialize};

/// One user record from the users API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<u64>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
}

/// Paged user-list envelope returned by GET /users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserListResponse {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub total: Option<u32>,
    pub total_pages: Option<u32>,
    pub data: Option<Vec<User>>,
}
