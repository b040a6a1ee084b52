//! REST client for the Jimeng web API.
//!
//! Wraps the generate, history and resource download endpoints using
//! [`reqwest`], signing every call through [`TokenManager`] and normalizing
//! responses into [`SubmissionResult`]s.

use std::time::Duration;

use async_trait::async_trait;
use dreamcanvas_core::task::TaskStatus;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};

use crate::client::{GenerationParams, JobClient, SubmissionResult};
use crate::error::JimengError;
use crate::history::normalize_history;
use crate::payload::{build_generation_payload, resolve_dimensions, resolve_model, AID};
use crate::token::{RequestToken, TokenManager, APP_VERSION};

/// Public Jimeng endpoint.
pub const DEFAULT_BASE_URL: &str = "https://jimeng.jianying.com";

const APP_SDK_VERSION: &str = "48.0.0";
const GENERATE_PATH: &str = "/mweb/v1/aigc_draft/generate";
const HISTORY_PATH: &str = "/mweb/v1/get_history_by_ids";
const REFERER: &str = "https://jimeng.jianying.com/ai-tool/generate";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`JimengApi`].
#[derive(Clone)]
pub struct JimengConfig {
    pub session_id: String,
    pub account_name: Option<String>,
    /// Proxy URL applied to all traffic.
    pub proxy: Option<String>,
    pub base_url: String,
}

impl std::fmt::Debug for JimengConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JimengConfig")
            .field("session_id", &"<redacted>")
            .field("account_name", &self.account_name)
            .field("proxy", &self.proxy)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl JimengConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            account_name: None,
            proxy: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// HTTP client for one Jimeng account.
#[derive(Debug)]
pub struct JimengApi {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenManager,
}

impl JimengApi {
    /// Build a client from configuration.
    pub fn new(config: &JimengConfig) -> Result<Self, JimengError> {
        let tokens = TokenManager::new(&config.session_id, config.account_name.as_deref())?;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = config.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Submit a generation job.
    ///
    /// After the generate call is accepted the history is fetched once; if
    /// that first fetch fails the job is reported as `running` so polling
    /// can pick it up.
    pub async fn submit_generation(
        &self,
        params: &GenerationParams,
    ) -> Result<SubmissionResult, JimengError> {
        let model_key = resolve_model(&params.model);
        let dims = resolve_dimensions(&params.size);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let payload = build_generation_payload(&params.prompt, model_key, &dims, params.batch, now_ms);

        let query = vec![
            ("babi_param", payload.babi_param.to_string()),
            ("aid", AID.to_string()),
            ("device_platform", "web".to_string()),
            ("region", "CN".to_string()),
            ("web_id", self.tokens.web_id().to_string()),
        ];

        let response = self
            .request(GENERATE_PATH, &query, &payload.body, true)
            .await?;
        check_ret(&response, "generation request rejected")?;

        let history_id = response
            .pointer("/data/aigc_data/history_record_id")
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| JimengError::Malformed {
                message: "response is missing the history record id".to_string(),
                payload: Some(response.clone()),
            })?;

        tracing::info!(
            history_id = %history_id,
            model = model_key,
            ratio = %dims.ratio,
            batch = params.batch,
            "Generation submitted to Jimeng",
        );

        match self.fetch_history(&history_id).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(history_id = %history_id, error = %e, "First history fetch failed");
                Ok(SubmissionResult {
                    raw: Some(response),
                    ..SubmissionResult::with_status(history_id, TaskStatus::Running)
                })
            }
        }
    }

    /// Fetch and normalize the history record of a job.
    pub async fn fetch_history(&self, history_id: &str) -> Result<SubmissionResult, JimengError> {
        let query = vec![
            ("aid", AID.to_string()),
            ("device_platform", "web".to_string()),
            ("region", "CN".to_string()),
            ("web_id", self.tokens.web_id().to_string()),
        ];
        let body = json!({
            "history_ids": [history_id],
            "image_info": {
                "width": 2048,
                "height": 2048,
                "format": "webp",
                "image_scene_list": [
                    {"scene": "normal", "width": 2400, "height": 2400, "uniq_key": "2400", "format": "webp"},
                    {"scene": "loss", "width": 1080, "height": 1080, "uniq_key": "1080", "format": "webp"},
                ],
            },
            "http_common_info": {"aid": AID},
        });

        let response = self.request(HISTORY_PATH, &query, &body, false).await?;
        check_ret(&response, "history query failed")?;

        let record = response
            .get("data")
            .and_then(|d| d.get(history_id))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(normalize_history(history_id, &record))
    }

    /// Download a generated resource.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, JimengError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::REFERER, REFERER)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Send a signed POST and parse the JSON body.
    ///
    /// With `query_tokens` the `msToken`/`a_bogus` values travel in the
    /// query string, otherwise in headers.
    async fn request(
        &self,
        api_path: &str,
        query: &[(&str, String)],
        body: &Value,
        query_tokens: bool,
    ) -> Result<Value, JimengError> {
        let token = self
            .tokens
            .token_for(api_path, chrono::Utc::now().timestamp());
        let headers = build_headers(&token, !query_tokens)?;

        let mut query = query.to_vec();
        if query_tokens {
            query.push(("msToken", token.ms_token.clone()));
            query.push(("a_bogus", token.a_bogus.clone()));
        }

        let response = self
            .client
            .post(format!("{}{api_path}", self.base_url))
            .query(&query)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(path = api_path, error = %e, "Jimeng returned non-JSON body");
            JimengError::Malformed {
                message: format!("response is not valid JSON: {e}"),
                payload: None,
            }
        })
    }
}

#[async_trait]
impl JobClient for JimengApi {
    fn account_label(&self) -> &str {
        self.tokens.account_label()
    }

    async fn submit(&self, params: &GenerationParams) -> Result<SubmissionResult, JimengError> {
        self.submit_generation(params).await
    }

    async fn fetch_status(&self, history_id: &str) -> Result<SubmissionResult, JimengError> {
        self.fetch_history(history_id).await
    }

    async fn fetch_resource(&self, url: &str) -> Result<Vec<u8>, JimengError> {
        self.download(url).await
    }
}

/// Ensure the response has a success status code, or turn it into
/// [`JimengError::Http`] carrying the body text.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, JimengError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        tracing::warn!(status = status.as_u16(), "Jimeng request failed");
        return Err(JimengError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Fail with [`JimengError::Rejected`] unless the application-level `ret`
/// field is `"0"`.
fn check_ret(response: &Value, fallback_message: &str) -> Result<(), JimengError> {
    let ret = match response.get("ret") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    };
    if ret == "0" {
        return Ok(());
    }

    let message = ["message", "msg", "error_msg"]
        .iter()
        .find_map(|k| response.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .unwrap_or(fallback_message)
        .to_string();
    Err(JimengError::Rejected {
        code: ret,
        message,
        payload: response.clone(),
    })
}

fn build_headers(token: &RequestToken, include_tokens: bool) -> Result<HeaderMap, JimengError> {
    let mut pairs: Vec<(&'static str, String)> = vec![
        ("accept", "application/json, text/plain, */*".into()),
        ("accept-language", "zh-CN,zh;q=0.9".into()),
        ("app-sdk-version", APP_SDK_VERSION.into()),
        ("appid", AID.into()),
        ("appvr", APP_VERSION.into()),
        ("cookie", token.cookie.clone()),
        ("device-time", token.device_time.clone()),
        ("lan", "zh-Hans".into()),
        ("loc", "cn".into()),
        ("origin", DEFAULT_BASE_URL.into()),
        ("pf", "7".into()),
        ("referer", REFERER.into()),
        ("sign", token.sign.clone()),
        ("sign-ver", "1".into()),
        ("user-agent", USER_AGENT.into()),
    ];
    if include_tokens {
        pairs.push(("mstoken", token.ms_token.clone()));
        pairs.push(("a-bogus", token.a_bogus.clone()));
    }

    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let value = HeaderValue::from_str(&value).map_err(|e| JimengError::Malformed {
            message: format!("invalid header value for {name}: {e}"),
            payload: None,
        })?;
        headers.insert(HeaderName::from_static(name), value);
    }
    Ok(headers)
}
