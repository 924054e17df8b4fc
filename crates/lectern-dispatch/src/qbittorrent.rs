//! qBittorrent Web API v2 client.
//!
//! # Design
//! - Sessions are explicit values returned by `login` and consumed by `logout`;
//!   the client holds no authentication state of its own.
//! - Every request carries its own deadline.

use std::time::Duration;

use lectern_config::EndpointDescriptor;
use reqwest::header::{COOKIE, REFERER, SET_COOKIE};
use reqwest::{Client, Response, Url};

use crate::error::EndpointError;
use crate::model::Task;

const LOGIN_PATH: &str = "api/v2/auth/login";
const LOGOUT_PATH: &str = "api/v2/auth/logout";
const VERSION_PATH: &str = "api/v2/app/version";
const ADD_PATH: &str = "api/v2/torrents/add";
const SESSION_COOKIE: &str = "SID";
const LOGIN_ACK: &str = "Ok.";
const REJECTED_ACK: &str = "Fails.";

/// Deadlines applied to endpoint calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointTimeouts {
    /// Login, version query and logout.
    pub probe: Duration,
    /// Task submission.
    pub submit: Duration,
}

impl Default for EndpointTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(5),
            submit: Duration::from_secs(10),
        }
    }
}

/// Authenticated session obtained from a successful login.
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    sid: String,
}

impl Session {
    fn cookie(&self) -> String {
        format!("{SESSION_COOKIE}={}", self.sid)
    }
}

/// Client bound to a single endpoint.
#[derive(Debug, Clone)]
pub struct QbittorrentClient {
    http: Client,
    name: String,
    base_url: Url,
    username: String,
    password: String,
    timeouts: EndpointTimeouts,
}

impl QbittorrentClient {
    /// Bind a client to an endpoint descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::NotConfigured`] when the descriptor lacks an
    /// address or credentials and [`EndpointError::InvalidUrl`] when the
    /// address cannot be parsed.
    pub fn new(
        http: Client,
        endpoint: &EndpointDescriptor,
        timeouts: EndpointTimeouts,
    ) -> Result<Self, EndpointError> {
        if !endpoint.is_configured() {
            return Err(EndpointError::NotConfigured);
        }
        let (Some(raw_url), Some(username), Some(password)) = (
            endpoint.base_url.as_deref(),
            endpoint.username.as_deref(),
            endpoint.password.as_deref(),
        ) else {
            return Err(EndpointError::NotConfigured);
        };

        let mut normalized = raw_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).map_err(|_| EndpointError::InvalidUrl {
            value: raw_url.to_string(),
        })?;

        Ok(Self {
            http,
            name: endpoint.name.clone(),
            base_url,
            username: username.to_string(),
            password: password.to_string(),
            timeouts,
        })
    }

    /// Endpoint name the client is bound to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, path: &str) -> Result<Url, EndpointError> {
        self.base_url
            .join(path)
            .map_err(|_| EndpointError::InvalidUrl {
                value: format!("{}{path}", self.base_url),
            })
    }

    /// Perform the login handshake.
    ///
    /// # Errors
    ///
    /// [`EndpointError::AuthRejected`] for a non-success status or a `Fails.`
    /// body, [`EndpointError::MalformedAck`] when the acknowledgement or the
    /// session cookie is missing, and timeout/transport errors otherwise.
    pub async fn login(&self) -> Result<Session, EndpointError> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH)?)
            .header(REFERER, self.base_url.as_str())
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .timeout(self.timeouts.probe)
            .send()
            .await
            .map_err(|err| EndpointError::from_reqwest("login", err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::AuthRejected {
                status: status.as_u16(),
            });
        }

        let sid = session_cookie(&response);
        let body = response
            .text()
            .await
            .map_err(|err| EndpointError::from_reqwest("login", err))?;
        if body.trim() == REJECTED_ACK {
            return Err(EndpointError::AuthRejected {
                status: status.as_u16(),
            });
        }
        if body.trim() != LOGIN_ACK {
            return Err(EndpointError::MalformedAck { operation: "login" });
        }
        let sid = sid.ok_or(EndpointError::MalformedAck { operation: "login" })?;
        Ok(Session { sid })
    }

    /// Query the application version with an authenticated session.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Status`] for a non-success status, timeout/transport
    /// errors otherwise.
    pub async fn version(&self, session: &Session) -> Result<String, EndpointError> {
        let response = self
            .http
            .get(self.url(VERSION_PATH)?)
            .header(COOKIE, session.cookie())
            .timeout(self.timeouts.probe)
            .send()
            .await
            .map_err(|err| EndpointError::from_reqwest("version", err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status {
                operation: "version",
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|err| EndpointError::from_reqwest("version", err))?;
        Ok(body.trim().to_string())
    }

    /// Submit one task.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Status`] for a non-success status,
    /// [`EndpointError::Rejected`] when the endpoint answers `Fails.`, and
    /// timeout/transport errors otherwise.
    pub async fn submit(&self, session: &Session, task: &Task) -> Result<(), EndpointError> {
        let response = self
            .http
            .post(self.url(ADD_PATH)?)
            .header(COOKIE, session.cookie())
            .header(REFERER, self.base_url.as_str())
            .form(&submission_form(task))
            .timeout(self.timeouts.submit)
            .send()
            .await
            .map_err(|err| EndpointError::from_reqwest("submit", err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status {
                operation: "submit",
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|err| EndpointError::from_reqwest("submit", err))?;
        if body.trim() == REJECTED_ACK {
            return Err(EndpointError::Rejected);
        }
        Ok(())
    }

    /// Release a session.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Status`] for a non-success status, timeout/transport
    /// errors otherwise.
    pub async fn logout(&self, session: Session) -> Result<(), EndpointError> {
        let response = self
            .http
            .post(self.url(LOGOUT_PATH)?)
            .header(COOKIE, session.cookie())
            .header(REFERER, self.base_url.as_str())
            .timeout(self.timeouts.probe)
            .send()
            .await
            .map_err(|err| EndpointError::from_reqwest("logout", err))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(EndpointError::Status {
                operation: "logout",
                status: status.as_u16(),
            })
        }
    }
}

fn submission_form(task: &Task) -> Vec<(&'static str, String)> {
    let mut form = vec![("urls", task.locator.clone())];
    if let Some(save_path) = task.save_path.as_deref().filter(|value| !value.is_empty()) {
        form.push(("savepath", save_path.to_string()));
    }
    if let Some(category) = task.category.as_deref().filter(|value| !value.is_empty()) {
        form.push(("category", category.to_string()));
    }
    if !task.tags.is_empty() {
        form.push(("tags", task.tags.join(",")));
    }
    form
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|raw| cookie_value(raw, SESSION_COOKIE))
}

fn cookie_value(raw: &str, needle: &str) -> Option<String> {
    for entry in raw.split(';') {
        let mut parts = entry.splitn(2, '=');
        let name = parts.next().map(str::trim).unwrap_or_default();
        if !name.eq_ignore_ascii_case(needle) {
            continue;
        }
        return parts
            .next()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| value.trim_matches('"').to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use lectern_config::EndpointRole;

    type TestResult<T> = anyhow::Result<T>;

    fn descriptor(base_url: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            name: "seedbox".into(),
            base_url: Some(base_url.to_string()),
            username: Some("admin".into()),
            password: Some("adminadmin".into()),
            role: EndpointRole::Primary,
            vpn_gateway: None,
        }
    }

    fn client_for(server: &MockServer) -> TestResult<QbittorrentClient> {
        Ok(QbittorrentClient::new(
            Client::new(),
            &descriptor(&server.base_url()),
            EndpointTimeouts {
                probe: Duration::from_millis(500),
                submit: Duration::from_millis(500),
            },
        )?)
    }

    #[test]
    fn cookie_value_extracts_sid() {
        assert_eq!(
            cookie_value("SID=abc123; HttpOnly; path=/", "SID"),
            Some("abc123".to_string())
        );
        assert_eq!(cookie_value("other=1; sid=\"q\"", "SID"), Some("q".into()));
        assert_eq!(cookie_value("SID=; path=/", "SID"), None);
        assert_eq!(cookie_value("path=/", "SID"), None);
    }

    #[test]
    fn submission_form_includes_only_present_hints() {
        let form = submission_form(&Task::new("magnet:?xt=urn:btih:1"));
        assert_eq!(form, vec![("urls", "magnet:?xt=urn:btih:1".to_string())]);

        let task = Task::new("magnet:?xt=urn:btih:2")
            .with_save_path("/books")
            .with_category("audiobooks")
            .with_tags(["a", "b"]);
        let form = submission_form(&task);
        assert_eq!(form.len(), 4);
        assert!(form.contains(&("tags", "a,b".to_string())));
        assert!(form.contains(&("savepath", "/books".to_string())));
    }

    #[test]
    fn unconfigured_descriptor_is_rejected() {
        let mut endpoint = descriptor("http://127.0.0.1:1");
        endpoint.password = None;
        let result = QbittorrentClient::new(Client::new(), &endpoint, EndpointTimeouts::default());
        assert!(matches!(result, Err(EndpointError::NotConfigured)));
    }

    #[tokio::test]
    async fn login_version_submit_logout_round() -> TestResult<()> {
        let server = MockServer::start_async().await;
        let login = server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200)
                .header("set-cookie", "SID=session-1; HttpOnly; path=/")
                .body("Ok.");
        });
        let version = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v2/app/version")
                .header("cookie", "SID=session-1");
            then.status(200).body("v4.6.2");
        });
        let add = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v2/torrents/add")
                .header("cookie", "SID=session-1");
            then.status(200).body("Ok.");
        });
        let logout = server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/logout");
            then.status(200);
        });

        let client = client_for(&server)?;
        let session = client.login().await?;
        assert_eq!(client.version(&session).await?, "v4.6.2");
        client
            .submit(&session, &Task::new("magnet:?xt=urn:btih:abc"))
            .await?;
        client.logout(session).await?;

        login.assert();
        version.assert();
        add.assert();
        logout.assert();
        Ok(())
    }

    #[tokio::test]
    async fn login_without_ack_is_malformed() -> TestResult<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(200).body("<html>proxy</html>");
        });
        let client = client_for(&server)?;
        let result = client.login().await;
        assert!(matches!(
            result,
            Err(EndpointError::MalformedAck { operation: "login" })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn login_refusal_is_auth_rejected() -> TestResult<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/auth/login");
            then.status(403).body("Forbidden");
        });
        let client = client_for(&server)?;
        let result = client.login().await;
        assert!(matches!(
            result,
            Err(EndpointError::AuthRejected { status: 403 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn fails_body_on_add_is_rejection() -> TestResult<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/api/v2/torrents/add");
            then.status(200).body("Fails.");
        });
        let client = client_for(&server)?;
        let session = Session {
            sid: "s".to_string(),
        };
        let result = client.submit(&session, &Task::new("magnet:?x")).await;
        assert!(matches!(result, Err(EndpointError::Rejected)));
        Ok(())
    }

    #[tokio::test]
    async fn slow_version_query_times_out() -> TestResult<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v2/app/version");
            then.status(200)
                .delay(Duration::from_secs(2))
                .body("v4.6.2");
        });
        let client = client_for(&server)?;
        let session = Session {
            sid: "s".to_string(),
        };
        let result = client.version(&session).await;
        assert!(matches!(
            result,
            Err(EndpointError::Timeout {
                operation: "version"
            })
        ));
        Ok(())
    }
}
