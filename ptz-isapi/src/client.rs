use std::sync::Mutex;
use std::time::Duration;

use digest_auth::{AuthContext, HttpMethod, WwwAuthenticateHeader};
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use osprey_types::{PtzConfig, PtzPose};

use crate::{Error, Result};

const STATUS_PATH: &str = "/ISAPI/PTZCtrl/channels/1/status";
const ABSOLUTE_PATH: &str = "/ISAPI/PTZCtrl/channels/1/absolute";

/// Transport retry budget; the camera link flaps under load.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Body of `PUT /ISAPI/PTZCtrl/channels/1/absolute`.
pub fn absolute_body(pose: &PtzPose) -> String {
    let q = pose.quantize();
    format!(
        "<PTZData><AbsoluteHigh><azimuth>{}</azimuth><elevation>{}</elevation><absoluteZoom>{}</absoluteZoom></AbsoluteHigh></PTZData>",
        q.pan as i64, q.tilt as i64, q.zoom as i64
    )
}

#[derive(Debug, Deserialize)]
struct AbsoluteHighXml {
    azimuth: f64,
    elevation: f64,
    #[serde(rename = "absoluteZoom")]
    absolute_zoom: f64,
}

#[derive(Debug, Deserialize)]
struct PtzStatusXml {
    #[serde(rename = "AbsoluteHigh")]
    absolute_high: AbsoluteHighXml,
}

/// Parse the camera's status XML into a pose.
pub fn parse_status_xml(body: &str) -> Result<PtzPose> {
    let status: PtzStatusXml = serde_xml_rs::from_str(body)?;
    Ok(PtzPose::new(
        status.absolute_high.azimuth,
        status.absolute_high.elevation,
        status.absolute_high.absolute_zoom,
    ))
}

/// HTTP session to one camera: digest challenge cache, request retry, and
/// the two ISAPI endpoints the pipeline uses.
pub struct IsapiClient {
    http: reqwest::Client,
    base: String,
    username: String,
    password: String,
    challenge: Mutex<Option<WwwAuthenticateHeader>>,
}

impl IsapiClient {
    pub fn new(cfg: &PtzConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base: cfg.url.trim_end_matches('/').to_string(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            challenge: Mutex::new(None),
        })
    }

    pub async fn get_status(&self) -> Result<PtzPose> {
        let body = self.request(Method::GET, STATUS_PATH, None).await?;
        parse_status_xml(&body)
    }

    pub async fn put_absolute(&self, pose: &PtzPose) -> Result<()> {
        let body = absolute_body(pose);
        debug!(%pose, "sending absolute position");
        self.request(Method::PUT, ABSOLUTE_PATH, Some(body)).await?;
        Ok(())
    }

    /// Issue one idempotent request with digest auth and transport retry.
    async fn request(&self, method: Method, path: &str, body: Option<String>) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.request_once(method.clone(), path, body.clone()).await {
                Ok(text) => return Ok(text),
                Err(Error::Http { source }) if attempt + 1 < MAX_ATTEMPTS => {
                    attempt += 1;
                    let backoff = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        "transport error talking to camera ({source}), retrying in {backoff:?}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(Error::Http { .. }) => return Err(Error::RetriesExhausted(MAX_ATTEMPTS)),
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> Result<String> {
        let url = format!("{}{}", self.base, path);

        let mut req = self.http.request(method.clone(), &url);
        if let Some(auth) = self.auth_header(&method, path, body.as_deref())? {
            req = req.header(header::AUTHORIZATION, auth);
        }
        if let Some(b) = body.clone() {
            req = req.body(b);
        }

        let resp = req.send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Self::require_success(resp).await;
        }

        // Fresh challenge, answer it once.
        trace!("401 from camera, answering digest challenge");
        let challenge_value = resp
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::MissingChallenge)?
            .to_string();
        {
            let parsed = digest_auth::parse(&challenge_value)
                .map_err(|e| Error::DigestAuth(e.to_string()))?;
            *self.challenge.lock().expect("challenge lock") = Some(parsed);
        }

        let auth = self
            .auth_header(&method, path, body.as_deref())?
            .ok_or(Error::MissingChallenge)?;
        let mut req = self
            .http
            .request(method, &url)
            .header(header::AUTHORIZATION, auth);
        if let Some(b) = body {
            req = req.body(b);
        }
        Self::require_success(req.send().await?).await
    }

    fn auth_header(
        &self,
        method: &Method,
        path: &str,
        body: Option<&str>,
    ) -> Result<Option<String>> {
        let mut guard = self.challenge.lock().expect("challenge lock");
        let prompt = match guard.as_mut() {
            Some(p) => p,
            None => return Ok(None),
        };
        let mut ctx = AuthContext::new(
            self.username.as_str(),
            self.password.as_str(),
            path,
        );
        ctx.method = if *method == Method::PUT {
            HttpMethod::PUT
        } else if *method == Method::POST {
            HttpMethod::POST
        } else {
            HttpMethod::GET
        };
        ctx.body = body.map(|b| b.as_bytes().into());
        let answer = prompt
            .respond(&ctx)
            .map_err(|e| Error::DigestAuth(e.to_string()))?;
        Ok(Some(answer.to_header_string()))
    }

    async fn require_success(resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }
        Ok(resp.text().await?)
    }
}
