use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::errors::{GatewayError, ScannerError};
use crate::domain::participant::Participant;

// The use cases depend on these traits, not on the reqwest client or a camera library.

/// Answer of the code-resolution endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupReply {
    Found(Participant),
    NotFound { message: Option<String> },
}

/// Registration record returned by the check-in endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub registration: Participant,
    /// Backend flag for a prior check-in; `None` when the response omits it.
    pub already_checked_in: Option<bool>,
}

/// Port for participant resolution and free-text search.
#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    async fn lookup(&self, code: &str, event_id: &str) -> Result<LookupReply, GatewayError>;
    async fn search(&self, query: &str, event_id: &str) -> Result<Vec<Participant>, GatewayError>;
}

/// Port for the idempotent check-in mutation.
#[async_trait]
pub trait CheckInGateway: Send + Sync {
    async fn check_in(
        &self,
        event_id: &str,
        participant_id: &str,
    ) -> Result<CommitReceipt, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, pointed away from the kiosk user.
    Environment,
    User,
}

impl FacingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
}

/// Event streams produced by an open decoder.
pub struct DecoderStreams {
    /// Text decoded from camera frames, in arrival order.
    pub decoded: mpsc::Receiver<String>,
    /// Per-frame decode failures; non-fatal.
    pub errors: mpsc::Receiver<String>,
}

/// Port over a concrete camera QR decoder.
#[async_trait]
pub trait CameraDecoder: Send + Sync {
    async fn request_permission(&self) -> Result<PermissionState, ScannerError>;

    async fn open(
        &self,
        container_id: &str,
        facing: FacingMode,
    ) -> Result<DecoderStreams, ScannerError>;

    /// Releases the camera device. Synchronous so it can run from `Drop`.
    fn close(&self);
}
