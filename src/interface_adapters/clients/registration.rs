use crate::domain::{
    CheckInGateway, CommitReceipt, GatewayError, LookupReply, Participant, ParticipantDirectory,
};
use crate::interface_adapters::protocol::{
    CheckInRequest, CheckInResponse, ErrorResponse, LookupRequest, LookupResponse, SearchResponse,
};
use crate::interface_adapters::utils::token::request_token;
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub enum RegistrationClientError {
    InvalidBaseUrl(String),
    Build(reqwest::Error),
}

impl fmt::Display for RegistrationClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationClientError::InvalidBaseUrl(url) => {
                write!(f, "invalid registration api url: {url}")
            }
            RegistrationClientError::Build(err) => {
                write!(f, "failed to build registration http client: {err}")
            }
        }
    }
}

impl std::error::Error for RegistrationClientError {}

// Thin reqwest client for the registration backend's lookup, search and check-in routes.
#[derive(Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RegistrationClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistrationClientError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| RegistrationClientError::InvalidBaseUrl(base_url.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RegistrationClientError::Build)?;
        Ok(Self { http, base_url })
    }

    // Compose `{base}/{segments...}?_ts=<token>`; the token defeats intermediary caches.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("_ts", &request_token().to_string());
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        request
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .header(EXPIRES, "0")
            .send()
            .await
            .map_err(|err| GatewayError::Transient(format!("registration transport error: {err}")))
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

// Map a non-2xx response, keeping the upstream message for operators.
async fn upstream_error(response: Response) -> GatewayError {
    let status = response.status();
    let message = response
        .json::<ErrorResponse>()
        .await
        .ok()
        .map(|payload| payload.message)
        .unwrap_or_else(|| status.to_string());

    if is_retryable_status(status) {
        GatewayError::Transient(format!("registration upstream error {status}: {message}"))
    } else {
        GatewayError::Rejected {
            status: Some(status.as_u16()),
            message,
        }
    }
}

fn malformed(err: reqwest::Error) -> GatewayError {
    GatewayError::Malformed(err.to_string())
}

#[async_trait]
impl ParticipantDirectory for RegistrationClient {
    async fn lookup(&self, code: &str, event_id: &str) -> Result<LookupReply, GatewayError> {
        let url = self.endpoint(&["lookup"]);
        debug!(%url, code, "lookup request");
        let response = self
            .send(self.http.post(url).json(&LookupRequest { code, event_id }))
            .await?;
        let status = response.status();

        // Only a 404 carrying the notFound envelope is a definitive miss; a bare
        // 404 means the endpoint itself is missing.
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(upstream_error(response).await);
        }

        let body = response.json::<LookupResponse>().await;
        match (status, body) {
            (_, Ok(body)) if body.not_found => Ok(LookupReply::NotFound {
                message: body.message,
            }),
            (StatusCode::NOT_FOUND, body) => Err(GatewayError::Rejected {
                status: Some(status.as_u16()),
                message: body
                    .ok()
                    .and_then(|body| body.message)
                    .unwrap_or_else(|| status.to_string()),
            }),
            (_, Ok(LookupResponse {
                participant: Some(participant),
                ..
            })) => Ok(LookupReply::Found(participant.into())),
            (_, Ok(_)) => Err(GatewayError::Malformed(
                "lookup response has neither a participant nor notFound".to_string(),
            )),
            (_, Err(err)) => Err(malformed(err)),
        }
    }

    async fn search(&self, query: &str, event_id: &str) -> Result<Vec<Participant>, GatewayError> {
        let mut url = self.endpoint(&["search"]);
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("eventId", event_id);
        debug!(%url, "search request");

        let response = self.send(self.http.get(url)).await?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body = response.json::<SearchResponse>().await.map_err(malformed)?;
        Ok(body.results.into_iter().map(Participant::from).collect())
    }
}

#[async_trait]
impl CheckInGateway for RegistrationClient {
    async fn check_in(
        &self,
        event_id: &str,
        participant_id: &str,
    ) -> Result<CommitReceipt, GatewayError> {
        let url = self.endpoint(&["registrations", participant_id, "checkin"]);
        debug!(%url, participant_id, "check-in request");

        let response = self
            .send(self.http.post(url).json(&CheckInRequest { event_id }))
            .await?;
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body = response.json::<CheckInResponse>().await.map_err(malformed)?;
        Ok(CommitReceipt {
            registration: body.registration.into(),
            already_checked_in: body.already_checked_in,
        })
    }
}
