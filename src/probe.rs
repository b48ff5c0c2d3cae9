//! Probe client (component A, §4.A).

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::Service;

#[derive(Debug, Deserialize)]
struct ProbeCheck {
    name: String,
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeResponse {
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    checks: Vec<ProbeCheck>,
}

pub struct ProbeClient {
    client: Client,
    sev_1_apps: Vec<String>,
}

impl ProbeClient {
    pub fn new(timeout: Duration, sev_1_apps: Vec<String>) -> Self {
        Self::with_proxy(timeout, sev_1_apps, None)
    }

    /// `socks_proxy` is the optional `--socks-proxy` CLI flag (§6): when
    /// set, all outbound probe requests are routed through it.
    pub fn with_proxy(timeout: Duration, sev_1_apps: Vec<String>, socks_proxy: Option<&str>) -> Self {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy_url) = socks_proxy {
            let proxy = reqwest::Proxy::all(proxy_url).expect("socks proxy URL is valid");
            builder = builder.proxy(proxy);
        }
        let client = builder.build().expect("probe HTTP client configuration is valid");
        Self { client, sev_1_apps }
    }

    /// `name` contains (substring match) any configured high-severity app
    /// name ⇒ true (§4.A).
    pub fn is_high_severity(&self, name: &str) -> bool {
        self.sev_1_apps.iter().any(|app| name.contains(app.as_str()))
    }

    pub fn severity_for(&self, name: &str) -> u8 {
        if self.is_high_severity(name) { 1 } else { 2 }
    }

    /// Probe one service. Never returns an `Err` — every failure mode
    /// (transport, non-200, unparsable body, failing inner checks) becomes
    /// `Ok(false, <reason>)`, per §4.A and §7 kind 1/2.
    pub async fn check(&self, service: &Service) -> (bool, String) {
        let url = format!("http://{}{}", service.host, service.path);
        let resp = match self
            .client
            .get(&url)
            .header(reqwest::header::HOST, service.name.clone())
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return (false, e.to_string()),
        };

        if resp.status() != reqwest::StatusCode::OK {
            return (false, format!("Healthcheck endpoint returned non-200 status ({})", resp.status()));
        }

        let body: ProbeResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) => return (false, format!("Error parsing healthcheck response: {e}")),
        };

        let failing: Vec<&str> = body
            .checks
            .iter()
            .filter(|c| !c.ok)
            .map(|c| c.name.as_str())
            .collect();

        if failing.is_empty() {
            (true, String::new())
        } else {
            (
                false,
                format!("{} healthchecks failing ({})", failing.len(), failing.join(", ")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn svc(host: String, path: &str) -> Service {
        Service {
            name: "foo-1".to_string(),
            host,
            path: path.to_string(),
            categories: vec!["default".to_string()],
            ack: String::new(),
            service_key: "foo-1".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_checks_is_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/foo-1"))
            .and(header("Host", "foo-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "foo", "checks": []})))
            .mount(&server)
            .await;

        let probe = ProbeClient::new(Duration::from_secs(5), Vec::new());
        let host = server.address().to_string();
        let (ok, output) = probe.check(&svc(host, "/health/foo-1")).await;
        assert!(ok);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn any_failing_inner_check_marks_unhealthy_with_joined_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/foo-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "foo",
                "checks": [
                    {"name": "db", "ok": false},
                    {"name": "cache", "ok": true},
                    {"name": "queue", "ok": false},
                ]
            })))
            .mount(&server)
            .await;

        let probe = ProbeClient::new(Duration::from_secs(5), Vec::new());
        let host = server.address().to_string();
        let (ok, output) = probe.check(&svc(host, "/health/foo-1")).await;
        assert!(!ok);
        assert_eq!(output, "2 healthchecks failing (db, queue)");
    }

    #[tokio::test]
    async fn non_200_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/foo-1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let probe = ProbeClient::new(Duration::from_secs(5), Vec::new());
        let host = server.address().to_string();
        let (ok, output) = probe.check(&svc(host, "/health/foo-1")).await;
        assert!(!ok);
        assert!(output.contains("503"));
    }

    #[tokio::test]
    async fn unparsable_body_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health/foo-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let probe = ProbeClient::new(Duration::from_secs(5), Vec::new());
        let host = server.address().to_string();
        let (ok, _output) = probe.check(&svc(host, "/health/foo-1")).await;
        assert!(!ok);
    }

    #[test]
    fn is_high_severity_matches_by_substring() {
        let probe = ProbeClient::new(Duration::from_secs(5), vec!["publication-monitor".to_string()]);
        assert!(probe.is_high_severity("synthetic-image-publication-monitor"));
        assert!(!probe.is_high_severity("foo-1"));
        assert_eq!(probe.severity_for("synthetic-image-publication-monitor"), 1);
        assert_eq!(probe.severity_for("foo-1"), 2);
    }
}
