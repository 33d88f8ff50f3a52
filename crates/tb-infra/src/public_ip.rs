use std::time::Duration;

use async_trait::async_trait;

use crate::{Error, PublicIpProbe, Result};

const CHECKIP_URL: &str = "http://checkip.amazonaws.com/";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Asks a "what is my IP" endpoint for the current egress address.
pub struct CheckIpProbe {
    url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl CheckIpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            http: reqwest::Client::new(),
        }
    }
}

impl Default for CheckIpProbe {
    fn default() -> Self {
        Self::new(CHECKIP_URL, LOOKUP_TIMEOUT)
    }
}

#[async_trait]
impl PublicIpProbe for CheckIpProbe {
    async fn fetch_public_ip(&self) -> Result<String> {
        let resp = self
            .http
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::PublicIp(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::PublicIp(format!("{} returned {status}", self.url)));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::PublicIp(e.to_string()))?;
        Ok(body.trim().to_string())
    }
}
