//! Blocking HTTP client for the smart-me metering API (GET endpoints only).
//!
//! - Built once through [`ClientBuilder`]; immutable and shareable across threads afterwards.
//! - Every request is a single attempt. No retry, no caching.
//! - Authenticates with HTTP Basic credentials sent on every request.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeZone};
use http::StatusCode;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::models::smartme::*;
use crate::utils::format_query_timestamp;

/// Log level above which requests and transport failures are logged.
const TRACE_LOG_LEVEL: u8 = 1;

pub type TransportError = Box<dyn Error + Send + Sync>;

#[derive(Debug)]
pub enum SmartMeError {
    Config(String),
    Transport { url: String, source: TransportError },
    Http { url: String, status: u16, reason: String },
    Decode { url: String, path: String, source: serde_json::Error },
}

impl SmartMeError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            SmartMeError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl core::fmt::Display for SmartMeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SmartMeError::Config(s) => write!(f, "configuration error: {}", s),
            SmartMeError::Transport { url, source } => write!(f, "transport error: GET {}: {}", url, source),
            SmartMeError::Http { url, status, reason } => {
                write!(f, "GET {} returned code {} ({})", url, status, reason)
            }
            SmartMeError::Decode { url, path, source } => {
                write!(f, "decode error: GET {} at {}: {}", url, path, source)
            }
        }
    }
}

impl Error for SmartMeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SmartMeError::Transport { source, .. } => Some(source.as_ref()),
            SmartMeError::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<url::ParseError> for SmartMeError {
    fn from(value: url::ParseError) -> Self {
        SmartMeError::Config(format!("invalid base url: {}", value))
    }
}

/// Raw answer of a GET request, before any status handling.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Performs one GET request. Must not treat non-2xx statuses as errors.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, TransportError>;
}

/// Default transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        UreqTransport {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
        let mut req = self.agent.get(url);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let mut res = req.call()?;
        let status = res.status();
        // ureq caps bodies at 10 MiB by default; range queries can exceed that
        let body = res.body_mut().with_config().limit(u64::MAX).read_to_vec()?;
        Ok(HttpResponse { status, body })
    }
}

#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    credentials: Option<(String, String)>,
    log_level: u8,
    timeout: Option<Duration>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Requests and transport failures are logged when the level is above 1.
    pub fn log_level(mut self, log_level: u8) -> Self {
        self.log_level = log_level;
        self
    }

    /// Upper bound for a whole request. Ignored when a custom transport is set.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<SmartMeClient, SmartMeError> {
        let raw = self
            .base_url
            .ok_or_else(|| SmartMeError::Config("missing base url".to_string()))?;
        let base_url = Url::parse(raw.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(SmartMeError::Config(format!("base url {} cannot carry a path", raw)));
        }
        let (username, password) = self
            .credentials
            .ok_or_else(|| SmartMeError::Config("missing credentials".to_string()))?;
        let authorization = format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)));

        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(UreqTransport::new(self.timeout)),
        };

        Ok(SmartMeClient {
            base_url,
            authorization,
            log_level: self.log_level,
            transport,
        })
    }
}

pub struct SmartMeClient {
    base_url: Url,
    authorization: String,
    log_level: u8,
    transport: Arc<dyn Transport>,
}

impl core::fmt::Debug for SmartMeClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SmartMeClient")
            .field("base_url", &self.base_url.as_str())
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl SmartMeClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn from_config(cfg: &Config) -> Result<Self, SmartMeError> {
        let mut builder = Self::builder()
            .base_url(cfg.base_url.as_str())
            .credentials(cfg.username.as_str(), cfg.password.as_str())
            .log_level(cfg.log_level);
        if let Some(t) = cfg.timeout {
            builder = builder.timeout(t);
        }
        builder.build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.set_query(None);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Single authenticated GET; returns the body of a 200 response unparsed.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, SmartMeError> {
        if self.log_level > TRACE_LOG_LEVEL {
            debug!("GET {}", url);
        }

        let headers = [("Accept", "application/json"), ("Authorization", self.authorization.as_str())];
        let res = match self.transport.get(url, &headers) {
            Ok(res) => res,
            Err(e) => {
                if self.log_level > TRACE_LOG_LEVEL {
                    warn!("GET {} failed: {}", url, e);
                }
                return Err(SmartMeError::Transport {
                    url: url.to_string(),
                    source: e,
                });
            }
        };

        if res.status != StatusCode::OK {
            return Err(SmartMeError::Http {
                url: url.to_string(),
                status: res.status.as_u16(),
                reason: res.status.canonical_reason().unwrap_or("unknown status").to_string(),
            });
        }
        Ok(res.body)
    }

    fn get_json<T: DeserializeOwned>(&self, segments: &[&str], query: &[(&str, String)]) -> Result<T, SmartMeError> {
        let url = self.url(segments, query);
        let body = self.fetch(url.as_str())?;
        let decode_error = |path: String, source: serde_json::Error| SmartMeError::Decode {
            url: url.to_string(),
            path,
            source,
        };

        // Track the JSON path so shape mismatches point at the offending field
        let mut de = serde_json::Deserializer::from_slice(&body);
        let value = serde_path_to_error::deserialize(&mut de)
            .map_err(|e| decode_error(e.path().to_string(), e.into_inner()))?;
        de.end().map_err(|e| decode_error(".".to_string(), e))?;
        Ok(value)
    }

    pub fn get_devices(&self) -> Result<Vec<Device>, SmartMeError> {
        self.get_json(&["Devices"], &[])
    }

    pub fn get_device(&self, device_id: &DeviceId) -> Result<Device, SmartMeError> {
        self.get_json(&["Devices", device_id.as_str()], &[])
    }

    /// Current values of a device.
    pub fn get_values(&self, device_id: &DeviceId) -> Result<ValuesData, SmartMeError> {
        self.get_json(&["Values", device_id.as_str()], &[])
    }

    /// Values of a device as they were at `date`.
    pub fn get_values_in_past<Tz>(&self, device_id: &DeviceId, date: &DateTime<Tz>) -> Result<ValuesData, SmartMeError>
    where
        Tz: TimeZone,
        Tz::Offset: core::fmt::Display,
    {
        let q = [("date", format_query_timestamp(date))];
        self.get_json(&["ValuesInPast", device_id.as_str()], &q)
    }

    /// Values of a device between `start_date` and `end_date`, one snapshot per `interval`.
    pub fn get_values_in_past_multiple<Tz>(
        &self,
        device_id: &DeviceId,
        start_date: &DateTime<Tz>,
        end_date: &DateTime<Tz>,
        interval: u32,
    ) -> Result<Vec<ValuesData>, SmartMeError>
    where
        Tz: TimeZone,
        Tz::Offset: core::fmt::Display,
    {
        let q = [
            ("startDate", format_query_timestamp(start_date)),
            ("endDate", format_query_timestamp(end_date)),
            ("interval", interval.to_string()),
        ];
        self.get_json(&["ValuesInPastMultiple", device_id.as_str()], &q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Keeps every log line so tests can assert on what the client emitted.
    struct CapturingLogger {
        lines: Mutex<Vec<String>>,
    }

    impl log::Log for CapturingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("{} {}", record.level(), record.args()));
        }

        fn flush(&self) {}
    }

    static LOGGER: CapturingLogger = CapturingLogger {
        lines: Mutex::new(Vec::new()),
    };

    fn init_logging() {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    }

    /// Captured lines mentioning `needle`; tests run in parallel, so each uses its own host.
    fn logged(needle: &str) -> Vec<String> {
        LOGGER
            .lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.contains(needle))
            .cloned()
            .collect()
    }

    const BASE: &str = "https://smart-me.example/api";

    /// Answers every request with the same canned response and records what was asked.
    struct StaticTransport {
        status: StatusCode,
        body: Vec<u8>,
        requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    }

    impl StaticTransport {
        fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Arc<Self> {
            Arc::new(StaticTransport {
                status,
                body: body.into(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn fixture(path: &str) -> Arc<Self> {
            let body = std::fs::read(path).expect("fixture present");
            Self::new(StatusCode::OK, body)
        }

        fn urls(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
        }
    }

    impl Transport for StaticTransport {
        fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
            let headers = headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            self.requests.lock().unwrap().push((url.to_string(), headers));
            Ok(HttpResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn get(&self, _url: &str, _headers: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
            Err(Box::new(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused")))
        }
    }

    fn client(transport: Arc<dyn Transport>) -> SmartMeClient {
        init_logging();
        SmartMeClient::builder()
            .base_url(BASE)
            .credentials("user", "secret")
            .log_level(2)
            .transport(transport)
            .build()
            .expect("client")
    }

    fn device() -> DeviceId {
        DeviceId::from("a6fd9b4b-3f4c-4c1e-9a1e-4b7f4b0f1c01")
    }

    fn day() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (start, start + chrono::Duration::days(1))
    }

    /// Calls every endpoint once and returns the outcome of each.
    fn call_all(client: &SmartMeClient) -> Vec<Result<(), SmartMeError>> {
        let (start, end) = day();
        vec![
            client.get_devices().map(|_| ()),
            client.get_device(&device()).map(|_| ()),
            client.get_values(&device()).map(|_| ()),
            client.get_values_in_past(&device(), &start).map(|_| ()),
            client.get_values_in_past_multiple(&device(), &start, &end, 60).map(|_| ()),
        ]
    }

    #[test]
    fn build_requires_base_url() {
        let err = SmartMeClient::builder().credentials("user", "secret").build().unwrap_err();
        assert!(matches!(err, SmartMeError::Config(_)));
    }

    #[test]
    fn build_rejects_malformed_base_url() {
        for bad in ["", "not a url", "smart-me.com/api", "mailto:someone@example.com"] {
            let err = SmartMeClient::builder()
                .base_url(bad)
                .credentials("user", "secret")
                .build()
                .unwrap_err();
            assert!(matches!(err, SmartMeError::Config(_)), "{bad} accepted");
        }
    }

    #[test]
    fn build_requires_credentials() {
        let err = SmartMeClient::builder().base_url(BASE).build().unwrap_err();
        assert!(matches!(err, SmartMeError::Config(_)));
    }

    #[test]
    fn client_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmartMeClient>();
    }

    #[test]
    fn sends_basic_auth_and_accept_headers() {
        let transport = StaticTransport::fixture("tests/data/devices.json");
        client(transport.clone()).get_devices().expect("devices");

        let requests = transport.requests.lock().unwrap();
        let (_, headers) = &requests[0];
        assert!(headers.contains(&("Accept".to_string(), "application/json".to_string())));
        // base64("user:secret")
        assert!(headers.contains(&("Authorization".to_string(), "Basic dXNlcjpzZWNyZXQ=".to_string())));
    }

    #[test]
    fn list_devices_matches_payload() {
        let transport = StaticTransport::fixture("tests/data/devices.json");
        let devices = client(transport.clone()).get_devices().expect("devices");

        let expected: Vec<Device> =
            serde_json::from_slice(&std::fs::read("tests/data/devices.json").unwrap()).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices, expected);
        assert_eq!(transport.urls(), vec![format!("{BASE}/Devices")]);
    }

    #[test]
    fn builds_endpoint_urls() {
        let transport = StaticTransport::new(StatusCode::OK, "{}");
        let c = client(transport.clone());
        let (start, _) = day();

        c.get_device(&device()).expect("device");
        c.get_values(&device()).expect("values");
        c.get_values_in_past(&device(), &start).expect("values in past");

        assert_eq!(
            transport.urls(),
            vec![
                format!("{BASE}/Devices/{}", device()),
                format!("{BASE}/Values/{}", device()),
                format!("{BASE}/ValuesInPast/{}?date=2024-01-01T00%3A00%3A00Z", device()),
            ]
        );
    }

    #[test]
    fn range_query_is_rfc3339_and_url_encoded() {
        let transport = StaticTransport::fixture("tests/data/values-multiple.json");
        let (start, end) = day();
        let values = client(transport.clone())
            .get_values_in_past_multiple(&device(), &start, &end, 60)
            .expect("values");
        assert_eq!(values.len(), 2);

        let url = Url::parse(&transport.urls()[0]).unwrap();
        assert_eq!(url.path(), format!("/api/ValuesInPastMultiple/{}", device()));
        let query = url.query().expect("query string");
        assert!(query.contains("startDate=2024-01-01T00%3A00%3A00Z"), "{query}");
        assert!(query.contains("endDate=2024-01-02T00%3A00%3A00Z"), "{query}");
        assert!(query.contains("interval=60"), "{query}");
    }

    #[test]
    fn path_segments_are_escaped_and_trailing_slash_tolerated() {
        let transport = StaticTransport::new(StatusCode::OK, "{}");
        let c = SmartMeClient::builder()
            .base_url("https://smart-me.example/api/")
            .credentials("user", "secret")
            .transport(transport.clone())
            .build()
            .expect("client");

        c.get_device(&DeviceId::from("a/b c")).expect("device");
        assert_eq!(transport.urls(), vec!["https://smart-me.example/api/Devices/a%2Fb%20c".to_string()]);
    }

    #[test]
    fn non_200_status_is_a_protocol_error_for_every_endpoint() {
        let transport = StaticTransport::new(StatusCode::NOT_FOUND, "[]");
        let c = client(transport.clone());

        let results = call_all(&c);
        let urls = transport.urls();
        assert_eq!(urls.len(), results.len());
        for (result, url) in results.into_iter().zip(urls) {
            let err = result.unwrap_err();
            assert_eq!(err.status(), Some(404));
            let msg = err.to_string();
            assert!(msg.contains("404"), "{msg}");
            assert!(msg.contains("Not Found"), "{msg}");
            assert!(msg.contains(&url), "{msg}");
        }
    }

    #[test]
    fn other_success_codes_are_rejected() {
        let transport = StaticTransport::new(StatusCode::NO_CONTENT, "");
        let err = client(transport).get_devices().unwrap_err();
        assert_eq!(err.status(), Some(204));
    }

    #[test]
    fn malformed_json_is_a_decode_error_for_every_endpoint() {
        for body in ["not json", "\"not json\""] {
            let transport = StaticTransport::new(StatusCode::OK, body);
            for result in call_all(&client(transport)) {
                assert!(matches!(result, Err(SmartMeError::Decode { .. })), "{body}");
            }
        }
    }

    #[test]
    fn decode_error_names_the_offending_field() {
        let transport = StaticTransport::new(StatusCode::OK, r#"[{"Id":"x","Voltage":"high"}]"#);
        let err = client(transport).get_devices().unwrap_err();
        match err {
            SmartMeError::Decode { path, .. } => assert_eq!(path, "[0].Voltage"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let transport = StaticTransport::new(StatusCode::OK, "{} {}");
        let err = client(transport).get_values(&device()).unwrap_err();
        assert!(matches!(err, SmartMeError::Decode { .. }));
    }

    #[test]
    fn requests_and_failures_are_logged_only_above_level_one() {
        init_logging();
        for (level, host) in [(1, "quiet.example"), (2, "chatty.example")] {
            let c = SmartMeClient::builder()
                .base_url(format!("https://{host}/api"))
                .credentials("user", "secret")
                .log_level(level)
                .transport(Arc::new(FailingTransport))
                .build()
                .expect("client");
            assert!(c.get_devices().is_err());
        }

        assert_eq!(logged("quiet.example"), Vec::<String>::new());
        let chatty = logged("chatty.example");
        assert!(
            chatty.iter().any(|l| l == "DEBUG GET https://chatty.example/api/Devices"),
            "{chatty:?}"
        );
        assert!(
            chatty
                .iter()
                .any(|l| l.starts_with("WARN GET https://chatty.example/api/Devices failed")),
            "{chatty:?}"
        );
        assert!(chatty.iter().all(|l| !l.contains("secret") && !l.contains("dXNlcjpzZWNyZXQ=")));
    }

    #[test]
    fn transport_failures_are_wrapped() {
        let err = client(Arc::new(FailingTransport)).get_devices().unwrap_err();
        match &err {
            SmartMeError::Transport { url, .. } => assert_eq!(url, &format!("{BASE}/Devices")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.source().is_some());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn fetch_returns_raw_body() {
        let transport = StaticTransport::new(StatusCode::OK, "raw bytes");
        let body = client(transport).fetch(&format!("{BASE}/Anything")).expect("body");
        assert_eq!(body, b"raw bytes");
    }
}
