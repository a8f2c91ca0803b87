//! Artefact variants (spec.md §3): items to be indexed. Each variant maps to
//! exactly one logical index; text fields are fixed; embedding fields start
//! empty and are filled exactly once by the owning strategy's
//! `ensure_embeddings` step before the artefact is written to the engine.

use serde::{Deserialize, Serialize};

/// `{dataDir}/documents/*.json` — question/answer pairs with two vector fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub input: String,
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_embedding: Option<Vec<f32>>,
}

/// `{dataDir}/securitybooks/*.json` — input/output/summary triples with three
/// vector fields, the only artefact that exercises the multi-field weighted
/// search path end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityBook {
    pub input: String,
    pub output: String,
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_embedding: Option<Vec<f32>>,
}

/// `{dataDir}/mitre/*.json` — a single combined embedding field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mitre {
    pub input: String,
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Runtime union of the three concrete artefact shapes, used where an item
/// must be handled without statically knowing which strategy produced it
/// (e.g. `IndexStrategy::can_handle(&Artefact)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artefact {
    Document(Document),
    SecurityBook(SecurityBook),
    Mitre(Mitre),
}
