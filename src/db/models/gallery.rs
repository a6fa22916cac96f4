use serde::{Deserialize, Serialize};

// ============================================================================
// Published gallery entries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub app_type: Option<String>,
    pub thumbnail_url: Option<String>,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub published_at: String,
}

/// Filter and pagination for browsing published entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct GalleryQuery {
    /// Case-insensitive match on title/description.
    pub search: Option<String>,
    /// Exact app type filter.
    pub app_type: Option<String>,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

impl Default for GalleryQuery {
    fn default() -> Self {
        Self {
            search: None,
            app_type: None,
            page: 1,
            page_size: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPage {
    pub entries: Vec<GalleryEntry>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}
