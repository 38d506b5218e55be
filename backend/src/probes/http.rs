//! HTTP family: `http`, `keyword` and `json-query` monitors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, redirect, Client, Method, Url};
use serde::Deserialize;
use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

use super::{keyword_matches, OauthToken, ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;
use crate::monitor::tls;
use crate::version;

pub struct HttpDriver;

#[async_trait]
impl ProbeDriver for HttpDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let raw_url = monitor
            .url
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Monitor has no URL".to_string()))?;
        let url = Url::parse(raw_url)
            .map_err(|e| ProbeError::Config(format!("Invalid URL {raw_url}: {e}")))?;

        let client = build_client(monitor)?;
        let method = Method::from_bytes(monitor.method.as_bytes())
            .map_err(|_| ProbeError::Config(format!("Invalid HTTP method: {}", monitor.method)))?;
        let mut request = client.request(method, url.clone());

        if let Some(extra_headers) = monitor.header_map() {
            for (name, value) in extra_headers {
                let value = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                request = request.header(name, value);
            }
        }

        request = apply_auth(request, monitor, ctx).await?;
        request = apply_body(request, monitor)?;

        let started = Instant::now();
        let response = request
            .timeout(Duration::from_secs_f64(ctx.timeout))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Network("Request timed out".to_string())
                } else {
                    ProbeError::Network(e.to_string())
                }
            })?;
        beat.ping = Some(started.elapsed().as_millis() as f64);

        // The HTTP client does not hand the peer chain back, so a separate
        // handshake captures it while the endpoint is known reachable.
        if url.scheme() == "https" {
            let host = url.host_str().unwrap_or_default().to_string();
            let port = url.port_or_known_default().unwrap_or(443);
            match tls::collect_tls_info(&host, port, Duration::from_secs_f64(ctx.timeout)).await {
                Ok(info) => {
                    *ctx.tls_info.lock().expect("tls slot poisoned") = Some(info);
                }
                Err(e) => {
                    debug!(monitor_id = monitor.id, error = %e, "TLS chain capture failed.");
                }
            }
        }

        let status = response.status();
        if !status_accepted(&monitor.accepted_statuscode_items(), status.as_u16()) {
            return Err(ProbeError::Network(format!(
                "Status code {} not in accepted list {}",
                status.as_u16(),
                monitor.accepted_statuscodes
            )));
        }
        beat.status = Status::Up;
        beat.msg = status.to_string();

        match monitor.monitor_type.as_str() {
            "keyword" => check_keyword(monitor, beat, response).await?,
            "json-query" => check_json_query(monitor, beat, response).await?,
            _ => {
                if monitor.check_content_parameter {
                    check_content_fields(beat, response).await?;
                }
            }
        }
        Ok(ProbeOutcome::Beat)
    }
}

fn build_client(monitor: &Monitor) -> Result<Client, ProbeError> {
    let redirect_policy = if monitor.max_redirects <= 0 {
        redirect::Policy::none()
    } else {
        redirect::Policy::limited(monitor.max_redirects as usize)
    };

    let mut builder = Client::builder()
        .user_agent(version::http_user_agent())
        .danger_accept_invalid_certs(monitor.ignore_tls)
        .redirect(redirect_policy);

    if let Some(proxy_url) = monitor.proxy_url.as_deref() {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ProbeError::Config(format!("Invalid proxy URL: {e}")))?;
        builder = builder.proxy(proxy);
    }

    if let (Some(cert), Some(key)) = (monitor.tls_cert.as_deref(), monitor.tls_key.as_deref()) {
        let mut pem = Vec::with_capacity(cert.len() + key.len() + 1);
        pem.extend_from_slice(key.as_bytes());
        pem.push(b'\n');
        pem.extend_from_slice(cert.as_bytes());
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| ProbeError::Config(format!("Invalid client certificate: {e}")))?;
        builder = builder.identity(identity);
    }

    if let Some(ca) = monitor.tls_ca.as_deref() {
        let certificate = reqwest::Certificate::from_pem(ca.as_bytes())
            .map_err(|e| ProbeError::Config(format!("Invalid CA certificate: {e}")))?;
        builder = builder.add_root_certificate(certificate);
    }

    builder
        .build()
        .map_err(|e| ProbeError::Network(e.to_string()))
}

async fn apply_auth(
    request: reqwest::RequestBuilder,
    monitor: &Monitor,
    ctx: &ProbeContext<'_>,
) -> Result<reqwest::RequestBuilder, ProbeError> {
    match monitor.auth_method.as_deref().unwrap_or("none") {
        "" | "none" | "mtls" => Ok(request),
        "basic" => {
            let user = monitor.basic_auth_user.clone().unwrap_or_default();
            Ok(request.basic_auth(user, monitor.basic_auth_pass.clone()))
        }
        "oauth2-cc" => {
            let token = oauth_bearer_token(monitor, ctx).await?;
            Ok(request.bearer_auth(token))
        }
        "ntlm" => Err(ProbeError::Config(
            "NTLM authentication is not supported".to_string(),
        )),
        other => Err(ProbeError::Config(format!("Unknown auth method: {other}"))),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Client-credentials token, cached per monitor and refreshed shortly
/// before the advertised expiry.
async fn oauth_bearer_token(
    monitor: &Monitor,
    ctx: &ProbeContext<'_>,
) -> Result<String, ProbeError> {
    {
        let cached = ctx.oauth_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.expired() {
                return Ok(token.access_token.clone());
            }
        }
    }

    let token_url = monitor
        .oauth_token_url
        .as_deref()
        .ok_or_else(|| ProbeError::Config("OAuth token URL is not configured".to_string()))?;
    let client_id = monitor
        .oauth_client_id
        .as_deref()
        .ok_or_else(|| ProbeError::Config("OAuth client id is not configured".to_string()))?;
    let client_secret = monitor
        .oauth_client_secret
        .as_deref()
        .ok_or_else(|| ProbeError::Config("OAuth client secret is not configured".to_string()))?;

    let mut form: Vec<(&str, String)> = vec![("grant_type", "client_credentials".to_string())];
    if let Some(scopes) = monitor.oauth_scopes.as_deref() {
        if !scopes.is_empty() {
            form.push(("scope", scopes.to_string()));
        }
    }

    let client = Client::new();
    let request = if monitor.oauth_auth_method == "client_secret_post" {
        form.push(("client_id", client_id.to_string()));
        form.push(("client_secret", client_secret.to_string()));
        client.post(token_url).form(&form)
    } else {
        client
            .post(token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&form)
    };

    let token: TokenResponse = request
        .send()
        .await?
        .error_for_status()
        .map_err(|e| ProbeError::Config(format!("OAuth token request rejected: {e}")))?
        .json()
        .await
        .map_err(|e| ProbeError::Config(format!("Invalid OAuth token response: {e}")))?;

    // Refresh a little early rather than racing the expiry on the wire.
    let lifetime = token.expires_in.unwrap_or(3600).max(30) - 10;
    let cached = OauthToken {
        access_token: token.access_token.clone(),
        expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
    };
    *ctx.oauth_token.lock().await = Some(cached);
    Ok(token.access_token)
}

fn apply_body(
    request: reqwest::RequestBuilder,
    monitor: &Monitor,
) -> Result<reqwest::RequestBuilder, ProbeError> {
    let Some(body) = monitor.body.as_deref().filter(|body| !body.trim().is_empty()) else {
        return Ok(request);
    };

    match monitor.http_body_encoding.as_deref().unwrap_or("json") {
        "json" => {
            serde_json::from_str::<Value>(body)
                .map_err(|e| ProbeError::Config(format!("Invalid JSON request body: {e}")))?;
            Ok(request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.to_string()))
        }
        "xml" => Ok(request
            .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(body.to_string())),
        _ => Ok(request.body(body.to_string())),
    }
}

async fn check_keyword(
    monitor: &Monitor,
    beat: &mut Heartbeat,
    response: reqwest::Response,
) -> Result<(), ProbeError> {
    let keyword = monitor
        .keyword
        .as_deref()
        .ok_or_else(|| ProbeError::Config("Keyword is not configured".to_string()))?;
    let body = response.text().await?;

    if keyword_matches(&body, keyword, monitor.invert_keyword) {
        let presence = if monitor.invert_keyword { "absent" } else { "present" };
        beat.msg = format!("{}, keyword [{keyword}] is {presence}", beat.msg);
        return Ok(());
    }

    let snippet: String = body.chars().take(50).collect();
    if body.contains(keyword) {
        Err(ProbeError::Predicate(format!(
            "keyword [{keyword}] found in [{snippet}] while inverted"
        )))
    } else {
        Err(ProbeError::Predicate(format!(
            "keyword [{keyword}] not in [{snippet}]"
        )))
    }
}

async fn check_json_query(
    monitor: &Monitor,
    beat: &mut Heartbeat,
    response: reqwest::Response,
) -> Result<(), ProbeError> {
    let expected = monitor
        .expected_value
        .as_deref()
        .ok_or_else(|| ProbeError::Config("Expected value is not configured".to_string()))?;
    let raw_path = monitor.json_path.as_deref().unwrap_or("$");
    let json_path = JsonPath::parse(raw_path)
        .map_err(|e| ProbeError::Config(format!("Invalid JSON path {raw_path}: {e}")))?;

    let body: Value = response
        .json()
        .await
        .map_err(|e| ProbeError::Predicate(format!("Response is not JSON: {e}")))?;
    let nodes = json_path.query(&body).all();
    let rendered = match nodes.first() {
        None => "undefined".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };

    if rendered == expected {
        beat.msg = format!("JSON query passes (comparing {rendered} to {expected})");
        Ok(())
    } else {
        Err(ProbeError::Predicate(format!(
            "JSON query does not pass (comparing {rendered} to {expected})"
        )))
    }
}

/// `check_content_parameter` support: the response is either a JSON
/// document or an SSE stream of `data: <json>` frames. Every field whose
/// key ends in "content" is collected across all frames; the beat turns
/// DOWN only when at least one such field exists and every one is null.
async fn check_content_fields(
    beat: &mut Heartbeat,
    response: reqwest::Response,
) -> Result<(), ProbeError> {
    let body = response.text().await?;
    let fields = collect_content_fields(&body);
    if fields.is_empty() {
        return Ok(());
    }
    if fields.iter().all(|(_, value)| value.is_null()) {
        let paths: Vec<&str> = fields.iter().map(|(path, _)| path.as_str()).collect();
        return Err(ProbeError::Predicate(format!(
            "All content fields are null: {}",
            paths.join(", ")
        )));
    }
    beat.msg = format!("{} ({} content fields)", beat.msg, fields.len());
    Ok(())
}

pub(crate) fn collect_content_fields(body: &str) -> Vec<(String, Value)> {
    let mut fields = Vec::new();
    if let Ok(value) = serde_json::from_str::<Value>(body.trim()) {
        walk_content_fields(&value, "$", &mut fields);
        return fields;
    }
    for line in body.lines() {
        let Some(frame) = line.strip_prefix("data: ") else {
            continue;
        };
        let frame = frame.trim();
        if frame == "[DONE]" {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(frame) {
            walk_content_fields(&value, "$", &mut fields);
        }
    }
    fields
}

fn walk_content_fields(value: &Value, path: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                if key.to_lowercase().ends_with("content") {
                    out.push((child_path.clone(), child.clone()));
                }
                walk_content_fields(child, &child_path, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                walk_content_fields(child, &format!("{path}[{index}]"), out);
            }
        }
        _ => {}
    }
}

/// True when `status` matches any accepted item: `"NNN"` exact, `"Nxx"`
/// class, or `"LLL-HHH"` inclusive range.
pub fn status_accepted(items: &[String], status: u16) -> bool {
    items.iter().any(|item| status_item_matches(item, status))
}

fn status_item_matches(item: &str, status: u16) -> bool {
    let item = item.trim();
    if let Some((low, high)) = item.split_once('-') {
        if let (Ok(low), Ok(high)) = (low.trim().parse::<u16>(), high.trim().parse::<u16>()) {
            return (low..=high).contains(&status);
        }
        return false;
    }
    if let Some(class) = item.strip_suffix("xx") {
        if let Ok(class) = class.parse::<u16>() {
            return status / 100 == class;
        }
        return false;
    }
    item.parse::<u16>().map(|exact| exact == status).unwrap_or(false)
}
