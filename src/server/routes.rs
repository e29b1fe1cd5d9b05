//! Request routing and handlers.
//!
//! Two endpoints are served:
//! - `GET /metric/{name}/{count}` adds `count` to counter `name`
//! - `GET /q/metrics` renders every counter in Prometheus text format

use crate::exposition;
use crate::metrics::{Route, SELF_METRICS_PREFIX};
use crate::server::ApiError;
use crate::state::AppState;
use crate::util::{REQUEST_ID_HEADER, RequestId};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::convert::Infallible;
use tracing::{debug, error, info, warn};

const INCREMENT_PREFIX: &str = "/metric/";
const METRICS_PATH: &str = "/q/metrics";

/// A matched request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    /// `/metric/{name}/{count}`, both segments raw.
    Increment { name: &'a str, count: &'a str },
    /// `/q/metrics`
    Metrics,
    NotFound,
}

impl Endpoint<'_> {
    fn route(&self) -> Route {
        match self {
            Endpoint::Increment { .. } => Route::Increment,
            Endpoint::Metrics => Route::Metrics,
            Endpoint::NotFound => Route::Unmatched,
        }
    }
}

/// Match a request path against the known endpoints.
pub fn match_route(path: &str) -> Endpoint<'_> {
    if path == METRICS_PATH {
        return Endpoint::Metrics;
    }

    if let Some(rest) = path.strip_prefix(INCREMENT_PREFIX) {
        let mut segments = rest.split('/');
        if let (Some(name), Some(count), None) = (segments.next(), segments.next(), segments.next())
        {
            if !name.is_empty() && !count.is_empty() {
                return Endpoint::Increment { name, count };
            }
        }
    }

    Endpoint::NotFound
}

/// Percent-decode one path segment. Splitting on `/` happens first, so an
/// encoded `%2F` stays inside its segment.
pub fn decode_segment(raw: &str) -> Result<Cow<'_, str>, ApiError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ApiError::InvalidEncoding(raw.to_string()))
}

/// Parse the `count` path segment as a non-negative integer.
///
/// Negative values are rejected rather than applied, since a counter must
/// never decrease. `-0` is accepted as zero.
pub fn parse_count(raw: &str) -> Result<u64, ApiError> {
    if let Ok(count) = raw.parse::<u64>() {
        return Ok(count);
    }

    match raw.strip_prefix('-').map(str::parse::<u64>) {
        Some(Ok(0)) => Ok(0),
        Some(Ok(_)) => Err(ApiError::NegativeCount(raw.to_string())),
        _ => Err(ApiError::InvalidCount(raw.to_string())),
    }
}

/// Handle one HTTP request.
pub async fn handle_request<B>(
    req: Request<B>,
    state: AppState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let timer = state.metrics().start_request_timer();
    let request_id = RequestId::from_headers(req.headers());
    let path = req.uri().path();
    let method = req.method();

    debug!(request_id = %request_id, method = %method, path = %path, "request received");

    let endpoint = match_route(path);
    let route = endpoint.route();

    // HEAD is served like GET; the body is dropped below.
    let is_head = method == Method::HEAD;
    let result = if endpoint != Endpoint::NotFound && method != Method::GET && !is_head {
        Err(ApiError::MethodNotAllowed(method.clone()))
    } else {
        match endpoint {
            Endpoint::Increment { name, count } => increment(&state, name, count, &request_id),
            Endpoint::Metrics => scrape(&state),
            Endpoint::NotFound => Err(ApiError::NotFound(path.to_string())),
        }
    };

    let mut response = match result {
        Ok(response) => response,
        Err(e) => {
            if e.status().is_server_error() {
                error!(request_id = %request_id, path = %path, error = %e, "request failed");
            } else {
                warn!(request_id = %request_id, path = %path, error = %e, "request rejected");
            }
            e.into_response()
        }
    };

    if is_head {
        strip_body(&mut response);
    }

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status().as_u16();
    debug!(
        request_id = %request_id,
        status,
        duration_us = timer.elapsed().as_micros() as u64,
        "request completed"
    );
    timer.record(route, status);

    Ok(response)
}

fn increment(
    state: &AppState,
    raw_name: &str,
    raw_count: &str,
    request_id: &RequestId,
) -> Result<Response<Full<Bytes>>, ApiError> {
    let name = decode_segment(raw_name)?;
    let amount = parse_count(&decode_segment(raw_count)?)?;
    let name: &str = &name;

    // Self metrics share the scrape output; a user counter with the same
    // family name would make it invalid.
    if state.include_self_metrics() && name.starts_with(SELF_METRICS_PREFIX) {
        return Err(ApiError::ReservedName(name.to_string()));
    }

    let outcome = state.registry().increment(name, amount)?;

    if outcome.created {
        info!(request_id = %request_id, name = %name, "registered new counter");
    }
    debug!(
        request_id = %request_id,
        name = %name,
        amount = outcome.amount,
        value = outcome.value,
        "counter incremented"
    );

    let body = serde_json::json!({
        "message": format!("Incremented {} by {}", name, outcome.amount),
    })
    .to_string();
    Ok(json_response(StatusCode::OK, body))
}

fn scrape(state: &AppState) -> Result<Response<Full<Bytes>>, ApiError> {
    let snapshot = state.registry().snapshot();
    let mut body = exposition::render(&snapshot);

    if state.include_self_metrics() {
        state.metrics().set_registered_counters(snapshot.len());
        state.metrics().encode_into(&mut body)?;
    }

    Ok(text_response(StatusCode::OK, exposition::CONTENT_TYPE, body))
}

/// Replace the body with an empty one, keeping the length of the GET body.
fn strip_body(response: &mut Response<Full<Bytes>>) {
    let length = response.body().size_hint().exact().unwrap_or(0);
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(length));
    *response.body_mut() = Full::new(Bytes::new());
}

/// Build a JSON response with the given status.
pub(crate) fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    text_response(status, "application/json", body)
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use http_body_util::BodyExt;

    fn state() -> AppState {
        AppState::new(&Config::default())
    }

    async fn get(state: &AppState, uri: &str) -> (StatusCode, String, String) {
        let req = Request::builder().uri(uri).body(()).unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();
        let status = response.status();
        let content_type = response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_match_route() {
        assert_eq!(match_route("/q/metrics"), Endpoint::Metrics);
        assert_eq!(
            match_route("/metric/requests/5"),
            Endpoint::Increment {
                name: "requests",
                count: "5"
            }
        );
        assert_eq!(match_route("/metric/requests"), Endpoint::NotFound);
        assert_eq!(match_route("/metric/requests/"), Endpoint::NotFound);
        assert_eq!(match_route("/metric//5"), Endpoint::NotFound);
        assert_eq!(match_route("/metric/a/1/extra"), Endpoint::NotFound);
        assert_eq!(match_route("/q/metrics/"), Endpoint::NotFound);
        assert_eq!(match_route("/"), Endpoint::NotFound);
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("my%5Fcounter").unwrap(), "my_counter");
        assert_eq!(decode_segment("%31%30").unwrap(), "10");
        assert_eq!(decode_segment("plain").unwrap(), "plain");
        assert!(matches!(
            decode_segment("bad%FF"),
            Err(ApiError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("5").unwrap(), 5);
        assert_eq!(parse_count("+7").unwrap(), 7);
        assert_eq!(parse_count("0").unwrap(), 0);
        assert_eq!(parse_count("-0").unwrap(), 0);
        assert_eq!(parse_count("18446744073709551615").unwrap(), u64::MAX);
        assert!(matches!(parse_count("-3"), Err(ApiError::NegativeCount(_))));
        assert!(matches!(parse_count("abc"), Err(ApiError::InvalidCount(_))));
        assert!(matches!(parse_count("1.5"), Err(ApiError::InvalidCount(_))));
        assert!(matches!(
            parse_count("18446744073709551616"),
            Err(ApiError::InvalidCount(_))
        ));
    }

    #[tokio::test]
    async fn test_increment_then_scrape() {
        let state = state();

        let (status, content_type, body) = get(&state, "/metric/requests/5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["message"], "Incremented requests by 5");

        get(&state, "/metric/requests/3").await;
        assert_eq!(state.registry().get("requests"), Some(8));

        let (status, content_type, body) = get(&state, "/q/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, exposition::CONTENT_TYPE);
        assert_eq!(
            body,
            "# HELP requests Counter metric for requests\n\
             # TYPE requests counter\n\
             requests 8\n"
        );
    }

    #[tokio::test]
    async fn test_percent_encoded_segments() {
        let state = state();

        let (status, _, body) = get(&state, "/metric/my%5Fcounter/%31%30").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["message"], "Incremented my_counter by 10");
        assert_eq!(state.registry().get("my_counter"), Some(10));

        get(&state, "/metric/my_counter/1").await;
        assert_eq!(state.registry().get("my_counter"), Some(11));
        assert_eq!(state.registry().len(), 1);

        let (status, _, _) = get(&state, "/metric/bad%FF/1").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, _, _) = get(&state, "/metric/a%2Fb/1").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_head_served_without_body() {
        let state = state();
        get(&state, "/metric/hits/3").await;

        let req = Request::builder()
            .method(Method::HEAD)
            .uri("/q/metrics")
            .body(())
            .unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], exposition::CONTENT_TYPE);
        let expected_len = exposition::render(&state.registry().snapshot()).len();
        assert_eq!(
            response.headers()[CONTENT_LENGTH],
            expected_len.to_string().as_str()
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());

        let req = Request::builder()
            .method(Method::HEAD)
            .uri("/metric/hits/2")
            .body(())
            .unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.registry().get("hits"), Some(5));
    }

    #[tokio::test]
    async fn test_empty_scrape() {
        let (status, content_type, body) = get(&state(), "/q/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain; version=0.0.4; charset=utf-8");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_rejections() {
        let state = state();

        let (status, _, body) = get(&state, "/metric/requests/abc").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("not a valid integer"));

        let (status, _, body) = get(&state, "/metric/requests/-2").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("non-negative"));

        let (status, _, _) = get(&state, "/metric/bad-name/1").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _, _) = get(&state, "/metric/requests").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert!(state.registry().is_empty());
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let state = state();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/metric/requests/1")
            .body(())
            .unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(state.registry().is_empty());
    }

    #[tokio::test]
    async fn test_request_id_echoed() {
        let req = Request::builder()
            .uri("/q/metrics")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(())
            .unwrap();
        let response = handle_request(req, state()).await.unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");

        let req = Request::builder().uri("/nope").body(()).unwrap();
        let response = handle_request(req, state()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[REQUEST_ID_HEADER].len(), 36);
    }

    #[tokio::test]
    async fn test_self_metrics_appended_when_enabled() {
        let mut config = Config::default();
        config.exposition.include_self_metrics = true;
        let state = AppState::new(&config);

        get(&state, "/metric/hits/2").await;
        let (_, _, body) = get(&state, "/q/metrics").await;

        assert!(body.starts_with("# HELP hits Counter metric for hits\n"));
        assert!(body.contains("hits 2\n"));
        assert!(body.contains("promcount_http_requests_total"));
        assert!(body.contains("promcount_registered_counters 1"));
        assert_eq!(state.metrics().requests_served(Route::Increment, 200), 1);
    }

    #[tokio::test]
    async fn test_self_metric_names_reserved_when_enabled() {
        let mut config = Config::default();
        config.exposition.include_self_metrics = true;
        let state = AppState::new(&config);

        let (status, _, body) = get(&state, "/metric/promcount_registered_counters/7").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("reserved"));
        let (status, _, _) = get(&state, "/metric/promcount%5Fhttp_requests/1").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(state.registry().is_empty());

        let (_, _, body) = get(&state, "/q/metrics").await;
        assert_eq!(
            body.matches("# TYPE promcount_registered_counters ").count(),
            1
        );
        assert!(body.contains("# TYPE promcount_registered_counters gauge"));
    }

    #[tokio::test]
    async fn test_self_metric_prefix_free_when_disabled() {
        let state = state();
        let (status, _, _) = get(&state, "/metric/promcount_jobs/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.registry().get("promcount_jobs"), Some(1));
    }
}
