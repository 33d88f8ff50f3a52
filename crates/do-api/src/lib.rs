//! Typed Rust client for the DigitalOcean v2 API.
//!
//! Covers the subset needed to stand up a VPN droplet:
//! droplets (create, get, delete) and firewalls (create, delete).

mod types;

pub use types::*;

const BASE_URL: &str = "https://api.digitalocean.com/v2";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("digitalocean api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("digitalocean api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the DigitalOcean REST API.
#[derive(Clone)]
pub struct DoClient {
    token: String,
    base_url: String,
    http: reqwest::Client,
}

impl DoClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, BASE_URL)
    }

    /// Point the client at another API root (staging or a local stub).
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    /// Like `check` but also treats 404 as success (for delete idempotency).
    async fn check_allow_404(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    // ── Droplets ─────────────────────────────────────────────────────

    pub async fn create_droplet(&self, req: &CreateDropletRequest) -> Result<Droplet> {
        let resp = self
            .http
            .post(self.url("/droplets"))
            .header("Authorization", self.auth())
            .json(req)
            .send()
            .await?;

        let body: DropletEnvelope = Self::check(resp, "create droplet").await?.json().await?;
        Ok(body.droplet)
    }

    pub async fn get_droplet(&self, droplet_id: u64) -> Result<Droplet> {
        let resp = self
            .http
            .get(self.url(&format!("/droplets/{droplet_id}")))
            .header("Authorization", self.auth())
            .send()
            .await?;

        let body: DropletEnvelope = Self::check(resp, "get droplet").await?.json().await?;
        Ok(body.droplet)
    }

    pub async fn delete_droplet(&self, droplet_id: u64) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/droplets/{droplet_id}")))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check_allow_404(resp, "delete droplet").await?;
        Ok(())
    }

    // ── Firewalls ────────────────────────────────────────────────────

    pub async fn create_firewall(&self, req: &CreateFirewallRequest) -> Result<Firewall> {
        let resp = self
            .http
            .post(self.url("/firewalls"))
            .header("Authorization", self.auth())
            .json(req)
            .send()
            .await?;

        let body: FirewallEnvelope = Self::check(resp, "create firewall").await?.json().await?;
        Ok(body.firewall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let client = DoClient::with_base_url("t", "http://localhost:8080/v2/");
        assert_eq!(client.url("/droplets"), "http://localhost:8080/v2/droplets");
    }

    #[test]
    fn auth_header_uses_bearer_token() {
        let client = DoClient::new("secret");
        assert_eq!(client.auth(), "Bearer secret");
    }
}
