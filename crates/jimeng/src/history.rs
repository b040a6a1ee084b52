//! Normalization of raw Jimeng history records.
//!
//! The history endpoint returns loosely-typed JSON. The functions here turn
//! one record into a [`SubmissionResult`]: a task status, the generated
//! image URLs, queue information and error details.

use std::collections::HashSet;

use dreamcanvas_core::task::TaskStatus;
use serde_json::Value;

use crate::client::SubmissionResult;

/// History status code of a finished generation.
pub const STATUS_DONE: i64 = 50;

/// History status codes of a failed generation.
pub const FAILED_STATUS_CODES: &[i64] = &[60, 70];

const ERROR_CODE_KEYS: &[&str] = &["err_code", "task_err_code", "error_code"];
const ERROR_MESSAGE_KEYS: &[&str] = &["err_msg", "task_err_msg", "status_msg", "error_msg"];

/// Fallback queue message when `queue_info` cannot be interpreted.
const QUEUE_MESSAGE_FALLBACK: &str = "Task is waiting in the queue, please wait...";

/// Normalize one history record.
///
/// A missing or empty record means the service has not materialized the
/// job yet and is reported as `running`.
pub fn normalize_history(history_id: &str, history: &Value) -> SubmissionResult {
    if !is_truthy(history) {
        return SubmissionResult {
            raw: Some(history.clone()),
            ..SubmissionResult::with_status(history_id, TaskStatus::Running)
        };
    }

    let queue_info = history.get("queue_info").filter(|q| is_truthy(q)).cloned();
    let queue_message = queue_info.as_ref().map(format_queue_message);
    let error_code = extract_error_code(history);
    let error_message = extract_error_message(history);
    let result_urls = extract_image_urls(history);
    let status_code = history.get("status").and_then(as_i64);

    let status = derive_status(
        status_code,
        &result_urls,
        error_code.as_deref(),
        queue_info.is_some(),
    );

    SubmissionResult {
        history_id: history_id.to_string(),
        status,
        result_urls,
        queue_message,
        queue_info,
        error_code,
        error_message,
        raw: Some(history.clone()),
    }
}

/// Derive a task status from the fields of a history record.
///
/// Success needs both the done code and at least one result URL. Any error
/// code, or a failure status code, means failure. Queue info without error
/// means queued; everything else is still running.
pub fn derive_status(
    status_code: Option<i64>,
    result_urls: &[String],
    error_code: Option<&str>,
    has_queue_info: bool,
) -> TaskStatus {
    if status_code == Some(STATUS_DONE) && !result_urls.is_empty() {
        TaskStatus::Succeeded
    } else if error_code.is_some_and(|c| !c.is_empty()) {
        TaskStatus::Failed
    } else if status_code.is_some_and(|c| FAILED_STATUS_CODES.contains(&c)) {
        TaskStatus::Failed
    } else if has_queue_info {
        TaskStatus::Queued
    } else {
        TaskStatus::Running
    }
}

/// First non-empty error code among the known keys.
pub fn extract_error_code(history: &Value) -> Option<String> {
    ERROR_CODE_KEYS.iter().find_map(|key| match history.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    })
}

/// First non-blank error message among the known keys.
pub fn extract_error_message(history: &Value) -> Option<String> {
    ERROR_MESSAGE_KEYS.iter().find_map(|key| {
        history
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Extract generated image URLs, de-duplicated in order.
///
/// Prefers the `resources` list (image resources that are not one of the
/// uploaded input images) and falls back to the legacy `item_list`
/// structure when that yields nothing.
pub fn extract_image_urls(history: &Value) -> Vec<String> {
    let uploaded = extract_uploaded_uris(history);

    let mut urls: Vec<String> = array(history, "resources")
        .filter(|r| r.get("type").and_then(Value::as_str) == Some("image"))
        .filter(|r| {
            r.get("key")
                .and_then(Value::as_str)
                .map_or(true, |key| !uploaded.contains(key))
        })
        .filter_map(|r| non_empty_str(r.get("image_info")?.get("image_url")?))
        .collect();

    if urls.is_empty() {
        for item in array(history, "item_list") {
            let Some(image) = item.get("image") else {
                continue;
            };
            let large: Vec<&Value> = array(image, "large_images").collect();
            if large.is_empty() {
                urls.extend(image.get("image_url").and_then(non_empty_str));
            } else {
                urls.extend(
                    large
                        .into_iter()
                        .filter_map(|l| l.get("image_url").and_then(non_empty_str)),
                );
            }
        }
    }

    let mut seen = HashSet::new();
    urls.retain(|url| seen.insert(url.clone()));
    urls
}

/// URIs of input images uploaded as part of the draft (blend abilities).
fn extract_uploaded_uris(history: &Value) -> HashSet<String> {
    let Some(draft) = history.get("draft_content").and_then(Value::as_str) else {
        return HashSet::new();
    };
    let Ok(draft) = serde_json::from_str::<Value>(draft) else {
        return HashSet::new();
    };

    array(&draft, "component_list")
        .filter_map(|component| component.get("abilities")?.get("blend"))
        .flat_map(|blend| array(blend, "ability_list"))
        .flat_map(|ability| array(ability, "image_uri_list"))
        .filter_map(|uri| uri.as_str().map(str::to_string))
        .collect()
}

/// Render a human-readable queue message from a `queue_info` object.
pub fn format_queue_message(queue_info: &Value) -> String {
    let queue_idx = queue_info.get("queue_idx").and_then(as_i64).unwrap_or(0);
    let queue_length = queue_info.get("queue_length").and_then(as_i64).unwrap_or(0);
    let queue_status = queue_info.get("queue_status").and_then(as_i64).unwrap_or(0);

    let waiting = match queue_info
        .get("priority_queue_display_threshold")
        .and_then(|t| t.get("waiting_time_threshold"))
    {
        None => 0,
        Some(v) => match as_i64(v) {
            Some(secs) => secs,
            None => return QUEUE_MESSAGE_FALLBACK.to_string(),
        },
    };

    let (minutes, seconds) = (waiting / 60, waiting % 60);
    let time_desc = match (minutes, seconds) {
        (0, s) => format!("{s}s"),
        (m, 0) => format!("{m} min"),
        (m, s) => format!("{m} min {s}s"),
    };

    if queue_status != 1 {
        return "No queue, generating now...".to_string();
    }
    if queue_idx != 0 && queue_length != 0 {
        format!(
            "Queue length: {queue_length}\nPosition in queue: {queue_idx}\nEstimated wait: {time_desc}"
        )
    } else {
        format!("Task queued, estimated wait: {time_desc}")
    }
}

// ---- private helpers ----

/// Iterate the elements of `value[key]`, or nothing if it is not an array.
fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer value of a JSON number or numeric string.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JSON truthiness: null, false, zero, and empty strings/arrays/objects are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
