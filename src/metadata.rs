//! Project metadata helpers.
//!
//! A repository may ship a JSON metadata file describing how it should be
//! showcased. The file is opaque to storage except for `tech_stack`, which
//! feeds the technology tally.

use serde_json::{Map, Value as JsonValue, json};

/// Candidate metadata file paths, tried in order.
pub const METADATA_PATHS: [&str; 4] = [
    ".github/project_metadata.json",
    "project_metadata.json",
    "docs/project_metadata.json",
    ".metadata/project.json",
];

/// String entries of the `tech_stack` array. Non-string entries are ignored.
pub fn tech_stack(metadata: &JsonValue) -> Vec<String> {
    metadata
        .get("tech_stack")
        .and_then(JsonValue::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(JsonValue::as_str)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Returns `value` when it is an object, otherwise an empty object.
pub fn ensure_object(value: JsonValue) -> JsonValue {
    if value.is_object() {
        value
    } else {
        JsonValue::Object(Map::new())
    }
}

/// Decodes a stored metadata string.
///
/// Missing, malformed or non-object values come back as `{}`.
pub fn parse_stored(raw: Option<&str>, repo_url: &str) -> JsonValue {
    let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
        return JsonValue::Object(Map::new());
    };

    match serde_json::from_str::<JsonValue>(raw) {
        Ok(value) if value.is_object() => value,
        Ok(_) => {
            tracing::warn!(repo_url, "Stored metadata is not a JSON object; using {{}}");
            JsonValue::Object(Map::new())
        }
        Err(error) => {
            tracing::warn!(repo_url, %error, "Stored metadata is malformed; using {{}}");
            JsonValue::Object(Map::new())
        }
    }
}

/// Parses the raw bytes of a metadata file, accepting only JSON objects.
pub fn parse_metadata_file(bytes: &[u8]) -> Option<JsonValue> {
    serde_json::from_slice::<JsonValue>(bytes)
        .ok()
        .filter(JsonValue::is_object)
}

/// A starter metadata file for repository owners.
pub fn metadata_template() -> JsonValue {
    json!({
        "project_name": "Your Project Name",
        "tagline": "A short catchy description",
        "showcase_image": "URL to main project image",
        "demo_url": "URL to live demo if available",
        "documentation_url": "URL to project documentation",
        "features": [
            "Key feature 1",
            "Key feature 2",
            "Key feature 3"
        ],
        "tech_stack": [
            "Technology 1",
            "Technology 2",
            "Technology 3"
        ],
        "contact": {
            "email": "contact@example.com",
            "twitter": "your_twitter_handle",
            "linkedin": "your_linkedin_profile"
        },
        "contributors": [
            {
                "name": "Contributor Name",
                "github": "github_username",
                "role": "Role in project"
            }
        ]
    })
}
