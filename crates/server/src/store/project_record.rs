use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub tenant_id: Option<String>,
    pub name: String,
    pub description: String,
    pub status: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}
