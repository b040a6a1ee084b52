//! Generation request building.
//!
//! Resolves user-facing model names and size strings into what the
//! generate endpoint expects, and assembles the nested draft payload.

use rand::Rng;
use serde_json::{json, Value};

/// Application id sent with every request.
pub const AID: &str = "513695";

/// Model used when the requested one is unknown.
pub const DEFAULT_MODEL_KEY: &str = "3.0";

/// Model keys and the backend `req_key` each maps to.
const MODEL_REQ_KEYS: &[(&str, &str)] = &[
    ("4.0", "high_aes_general_v40"),
    ("3.1", "high_aes_general_v30l_art_fangzhou:general_v3.0_18b"),
    ("3.0", "high_aes_general_v30l:general_v3.0_18b"),
    ("2.1", "high_aes_general_v21_L:general_v2.1_L"),
    ("2.0p", "high_aes_general_v20_L:general_v2.0_L"),
    ("2.0", "high_aes_general_v20:general_v2.0"),
];

/// Accepted aliases for model keys.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("sdxl", "3.0"),
    ("sdxl-turbo", "3.0"),
    ("sdxl-lightning", "3.0"),
    ("v40", "4.0"),
    ("v31", "3.1"),
    ("v30", "3.0"),
    ("v21", "2.1"),
    ("v20p", "2.0p"),
    ("v20", "2.0"),
];

const DEFAULT_SIDE: u32 = 1024;

/// Backend `req_key` of a model key, if known.
pub fn model_req_key(model_key: &str) -> Option<&'static str> {
    MODEL_REQ_KEYS
        .iter()
        .find(|(key, _)| *key == model_key)
        .map(|(_, req)| *req)
}

/// Resolve a model name or alias to a known model key.
///
/// Unknown names fall back to [`DEFAULT_MODEL_KEY`].
pub fn resolve_model(name: &str) -> &'static str {
    let name = name.trim();
    let lowered = name.to_lowercase();
    let key = MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, key)| *key)
        .unwrap_or(name);

    match MODEL_REQ_KEYS.iter().find(|(k, _)| *k == key) {
        Some(&(k, _)) => k,
        None => {
            tracing::warn!(model = %name, fallback = DEFAULT_MODEL_KEY, "Unknown model, using fallback");
            DEFAULT_MODEL_KEY
        }
    }
}

/// Output dimensions derived from a size string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
    /// Reduced aspect ratio, e.g. `"16:9"`.
    pub ratio: String,
    /// `"1k"`, `"2k"` or `"4k"` depending on the longest side.
    pub resolution: &'static str,
}

/// Parse a size such as `1024x768`, `1024*768`, `1024×768` or `16:9`.
///
/// Unparseable input falls back to 1024×1024.
pub fn resolve_dimensions(size: &str) -> Dimensions {
    let cleaned = size.trim().to_lowercase().replace(['*', '×'], "x");
    let separator = if cleaned.contains(':') { ':' } else { 'x' };
    let mut parts = cleaned.split(separator);
    let parsed = match (parts.next(), parts.next()) {
        (Some(w), Some(h)) => w.trim().parse::<u32>().ok().zip(h.trim().parse::<u32>().ok()),
        _ => None,
    };
    let (width, height) = parsed.unwrap_or((DEFAULT_SIDE, DEFAULT_SIDE));

    let divisor = gcd(width, height).max(1);
    let ratio = format!("{}:{}", width / divisor, height / divisor);
    let max_side = width.max(height);
    let resolution = if max_side <= 1664 {
        "1k"
    } else if max_side <= 2688 {
        "2k"
    } else {
        "4k"
    };

    Dimensions {
        width,
        height,
        ratio,
        resolution,
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Leading component of a ratio string, as the API's `image_ratio` field.
fn ratio_value(ratio: &str) -> u32 {
    ratio
        .split(':')
        .next()
        .and_then(|first| first.parse().ok())
        .unwrap_or(1)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Body and `babi_param` query value of a generate request.
#[derive(Debug, Clone)]
pub struct GenerationPayload {
    pub body: Value,
    pub babi_param: Value,
}

/// Assemble the generate request for `prompt`.
///
/// `batch` is clamped to 1..=4.
pub fn build_generation_payload(
    prompt: &str,
    model_key: &str,
    dims: &Dimensions,
    batch: u8,
    now_ms: i64,
) -> GenerationPayload {
    let batch = batch.clamp(1, 4);
    let req_key = model_req_key(model_key)
        .or_else(|| model_req_key(DEFAULT_MODEL_KEY))
        .unwrap_or_default();
    let seed: u32 = rand::rng().random_range(1..=999_999_999);
    let component_id = new_id();

    let metrics_extra = json!({
        "templateId": "",
        "generateCount": batch,
        "promptSource": "custom",
        "templateSource": "",
        "lastRequestId": "",
        "originRequestId": "",
        "originSubmitId": "",
        "isDefaultSeed": 1,
        "originTemplateId": "",
        "imageNameMapping": {},
        "isUseAiGenPrompt": false,
        "batchNumber": batch,
    });

    let core_param = json!({
        "type": "",
        "id": new_id(),
        "model": req_key,
        "prompt": prompt,
        "negative_prompt": "",
        "seed": seed,
        "sample_strength": 0.5,
        "image_ratio": ratio_value(&dims.ratio),
        "generate_count": batch,
        "num_images": batch,
        "large_image_info": {
            "type": "",
            "id": new_id(),
            "height": dims.height,
            "width": dims.width,
            "resolution_type": dims.resolution,
        },
    });

    let draft_content = json!({
        "type": "draft",
        "id": new_id(),
        "min_version": "3.0.2",
        "min_features": [],
        "is_from_tsn": true,
        "version": "3.2.8",
        "main_component_id": component_id,
        "component_list": [{
            "type": "image_base_component",
            "id": component_id,
            "min_version": "3.0.2",
            "aigc_mode": "workbench",
            "metadata": {
                "type": "",
                "id": new_id(),
                "created_platform": 3,
                "created_platform_version": "",
                "created_time_in_ms": now_ms.to_string(),
                "created_did": "",
            },
            "generate_type": "generate",
            "abilities": {
                "type": "",
                "id": new_id(),
                "generate": {
                    "type": "",
                    "id": new_id(),
                    "core_param": core_param,
                    "history_option": {"type": "", "id": new_id()},
                },
            },
        }],
    });

    let body = json!({
        "extend": {"root_model": req_key, "template_id": ""},
        "submit_id": new_id(),
        "metrics_extra": metrics_extra.to_string(),
        "draft_content": draft_content.to_string(),
        "http_common_info": {"aid": AID},
    });

    let babi_param = json!({
        "scenario": "image_video_generation",
        "feature_key": "aigc_to_image",
        "feature_entrance": "to_image",
        "feature_entrance_detail": "to_image",
    });

    GenerationPayload { body, babi_param }
}
