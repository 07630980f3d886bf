// API client module: a small blocking HTTP client for the OMERO.web JSON
// API. It keeps the session cookie and the CSRF token so that the calls
// made after login are authenticated.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::REFERER;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// Port of the OMERO server process itself (not the web front end). Used to
/// pick the server entry to log in to.
pub const DEFAULT_PORT: u16 = 4064;

const CSRF_HEADER: &str = "X-CSRFToken";

/// Blocking client bound to one OMERO.web instance. Cloning shares the
/// underlying connection pool and cookie jar.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    csrf_token: Option<String>,
}

/// One entry of `/api/v0/servers/`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub id: i64,
    pub host: String,
    pub port: u16,
}

/// Identity of the logged-in user as reported by the login endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct EventContext {
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "groupId")]
    pub group_id: i64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ExperimenterGroup {
    #[serde(rename = "@id")]
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    #[serde(rename = "eventContext")]
    event_context: Option<EventContext>,
    message: Option<String>,
}

/// Turn what the user typed in the host prompt into a base URL. Bare host
/// names get `https://`; plain `http://` is refused.
pub fn base_url_for(host: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("https://") {
        Ok(host.to_string())
    } else if host.starts_with("http://") {
        anyhow::bail!("Refusing insecure connection to {host}; use https://")
    } else {
        Ok(format!("https://{host}"))
    }
}

/// Choose the server entry to log in to: the one on the default OMERO port,
/// else the first listed.
pub fn select_server(servers: &[ServerInfo]) -> Option<&ServerInfo> {
    servers
        .iter()
        .find(|s| s.port == DEFAULT_PORT)
        .or_else(|| servers.first())
}

impl ApiClient {
    /// Create a client for the server typed by the user.
    pub fn new(host: &str) -> Result<Self> {
        let base_url = base_url_for(host)?;
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url,
            csrf_token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the CSRF token and referer required by Django on
    /// state-changing requests.
    fn with_csrf(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header(REFERER, format!("{}/", self.base_url));
        match &self.csrf_token {
            Some(token) => req.header(CSRF_HEADER, token),
            None => req,
        }
    }

    /// Fail with the status and body when the response is not a success.
    fn check(res: Response, what: &str) -> Result<Response> {
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            anyhow::bail!("{} failed: {} - {}", what, status, txt);
        }
        Ok(res)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .with_context(|| format!("Failed to send {what} request"))?;
        let res = Self::check(res, what)?;
        res.json()
            .with_context(|| format!("Parsing {what} response json"))
    }

    /// Fetch the CSRF token and keep it for later requests.
    pub fn fetch_csrf_token(&mut self) -> Result<()> {
        let token: DataEnvelope<String> = self.get_json("/api/v0/token/", "CSRF token")?;
        self.csrf_token = Some(token.data);
        Ok(())
    }

    pub fn servers(&self) -> Result<Vec<ServerInfo>> {
        let servers: DataEnvelope<Vec<ServerInfo>> =
            self.get_json("/api/v0/servers/", "server list")?;
        Ok(servers.data)
    }

    /// Log in to the given server entry. The session cookie set by the
    /// response is kept in the client's cookie jar.
    pub fn login(&self, server_id: i64, username: &str, password: &str) -> Result<EventContext> {
        let server = server_id.to_string();
        let form = [
            ("server", server.as_str()),
            ("username", username),
            ("password", password),
        ];
        let res = self
            .with_csrf(self.client.post(self.url("/api/v0/login/")))
            .form(&form)
            .send()
            .context("Failed to send login request")?;

        let status = res.status();
        let body: LoginResponse = match res.json() {
            Ok(body) => body,
            Err(_) => anyhow::bail!("Login failed: {}", status),
        };
        if !status.is_success() || !body.success {
            let message = body.message.unwrap_or_else(|| status.to_string());
            anyhow::bail!("Login failed: {}", message);
        }
        body.event_context
            .context("Login response did not include an event context")
    }

    /// Groups the experimenter is a member of.
    pub fn experimenter_groups(&self, user_id: i64) -> Result<Vec<ExperimenterGroup>> {
        let path = format!("/api/v0/m/experimenters/{user_id}/experimentergroups/");
        let groups: DataEnvelope<Vec<ExperimenterGroup>> = self.get_json(&path, "group list")?;
        Ok(groups.data)
    }

    /// Save a new object within `group_id` and return the saved object.
    pub fn save(&self, group_id: i64, object: &Value) -> Result<Value> {
        let url = self.url("/api/v0/m/save/");
        let res = self
            .with_csrf(self.client.post(&url))
            .query(&[("group", group_id)])
            .json(object)
            .send()
            .context("Failed to send save request")?;
        let res = Self::check(res, "Save")?;
        let saved: DataEnvelope<Value> = res.json().context("Parsing save response json")?;
        Ok(saved.data)
    }

    /// Touch the session so the server does not expire it while idle.
    pub fn keepalive_ping(&self) -> Result<()> {
        let res = self
            .client
            .get(self.url("/webclient/keepalive_ping/"))
            .send()
            .context("Failed to send keep-alive request")?;
        Self::check(res, "Keep-alive")?;
        Ok(())
    }

    pub fn logout(&self) -> Result<()> {
        let res = self
            .with_csrf(self.client.post(self.url("/webclient/logout/")))
            .send()
            .context("Failed to send logout request")?;
        Self::check(res, "Logout")?;
        Ok(())
    }
}
