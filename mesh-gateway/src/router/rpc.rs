use crate::app::AppState;
use axum::{
    extract::{Path, State},
    response::Response,
};
use bytes::Bytes;
use mesh_relay::{relay::handler::create_error_response, ErrorType};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// 通用 RPC 透传：`POST /rpc/{service}/{method}`，请求体原样作为 payload
pub async fn rpc_passthrough(
    State(state): State<AppState>,
    Path((service, method)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    forward(state, &service, &method, HashMap::new(), body).await
}

/// 把路径参数与请求体合并为 payload 后交给网关处理器
pub async fn forward(
    state: AppState,
    service: &str,
    method: &str,
    params: HashMap<String, String>,
    body: Bytes,
) -> Response {
    let response = match build_payload(params, &body) {
        Ok(payload) => state.handler.handle(service, method, payload).await,
        Err(message) => {
            tracing::debug!("Rejecting request for {}/{}: {}", service, method, message);
            create_error_response(ErrorType::BadRequest, &message, None)
        }
    };

    #[cfg(feature = "observability")]
    if let Some(ref metrics) = state.prometheus_metrics {
        metrics.record_request(service, response.status().as_u16());
    }

    response
}

/// 空请求体视为 `{}`；有路径参数时请求体必须是 JSON 对象，路径参数覆盖同名字段
pub fn build_payload(params: HashMap<String, String>, body: &[u8]) -> Result<Value, String> {
    let mut payload = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(body).map_err(|e| format!("Invalid JSON body: {e}"))?
    };

    if params.is_empty() {
        return Ok(payload);
    }

    let Some(object) = payload.as_object_mut() else {
        return Err("Request body must be a JSON object when the route has path parameters".into());
    };
    for (name, value) in params {
        object.insert(name, json!(value));
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        assert_eq!(build_payload(HashMap::new(), b"").unwrap(), json!({}));
        assert_eq!(build_payload(HashMap::new(), b"  \n").unwrap(), json!({}));
    }

    #[test]
    fn test_path_params_become_fields() {
        let payload = build_payload(params(&[("id", "42")]), b"").unwrap();
        assert_eq!(payload, json!({ "id": "42" }));
    }

    #[test]
    fn test_path_params_override_body() {
        let payload =
            build_payload(params(&[("id", "42")]), br#"{"id": "7", "verbose": true}"#).unwrap();
        assert_eq!(payload, json!({ "id": "42", "verbose": true }));
    }

    #[test]
    fn test_non_object_body_passes_through_without_params() {
        let payload = build_payload(HashMap::new(), b"[1, 2, 3]").unwrap();
        assert_eq!(payload, json!([1, 2, 3]));
    }

    #[test]
    fn test_non_object_body_with_params_rejected() {
        assert!(build_payload(params(&[("id", "42")]), b"[1]").is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = build_payload(HashMap::new(), b"{not json").unwrap_err();
        assert!(err.starts_with("Invalid JSON body"));
    }
}
