//! Bus request/response wire shapes (spec.md §6). Field names use
//! `camelCase` on the wire, matching the JSON the transport delivers.

use serde::{Deserialize, Serialize};

/// Search mode a query request may pin; unknown modes degrade to `content`
/// per spec.md §4.4 `vector_field`. `#[serde(other)]` makes that degradation
/// happen at decode time: any `vectorSearchMode` string outside the three
/// known ones lands on `Content` instead of failing the whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorSearchMode {
    Question,
    Summary,
    #[serde(other)]
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndexRequest {
    pub index_name: String,

    /// Path to the JSON file to index, for the single-file flow.
    #[serde(default)]
    pub json_file: Option<String>,

    /// Inline alternative to `json_file` for the single-file flow: the JSON
    /// array of items, sent in the request body instead of read from disk.
    #[serde(default)]
    pub json_mapping: Option<serde_json::Value>,

    #[serde(default)]
    pub recreate_index: bool,

    #[serde(default)]
    pub create_from_json_data_dir: bool,

    pub app_id: String,
    pub auth_key: String,

    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIndexRequest {
    pub index_name: String,
    pub query_text: String,

    #[serde(default)]
    pub vector_search_mode: Option<VectorSearchMode>,

    pub app_id: String,
    pub auth_key: String,

    #[serde(default)]
    pub routing_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSnapshotRequest {
    pub snapshot_repo: String,
    pub snapshot_name: String,
    pub indices: Vec<String>,
}

/// One projected hit: `{input, output}` per spec.md §4.8 step 6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultItem {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIndexResponse {
    pub success: bool,
    pub message: String,
    pub query_results: Vec<QueryResultItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_vector_search_mode_string_degrades_to_content() {
        let mode: VectorSearchMode = serde_json::from_str("\"paragraph\"").unwrap();
        assert_eq!(mode, VectorSearchMode::Content);
    }

    #[test]
    fn known_vector_search_mode_strings_decode_exactly() {
        assert_eq!(
            serde_json::from_str::<VectorSearchMode>("\"question\"").unwrap(),
            VectorSearchMode::Question
        );
        assert_eq!(
            serde_json::from_str::<VectorSearchMode>("\"summary\"").unwrap(),
            VectorSearchMode::Summary
        );
        assert_eq!(
            serde_json::from_str::<VectorSearchMode>("\"content\"").unwrap(),
            VectorSearchMode::Content
        );
    }

    #[test]
    fn query_index_request_decodes_camel_case_wire_shape() {
        let raw = serde_json::json!({
            "indexName": "documents",
            "queryText": "q1",
            "vectorSearchMode": "content",
            "appId": "app-1",
            "authKey": "secret"
        });
        let request: QueryIndexRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.index_name, "documents");
        assert_eq!(request.vector_search_mode, Some(VectorSearchMode::Content));
        assert_eq!(request.routing_key, None);
    }
}
