// Owned camera resource wrapping an injected decoder.

use crate::domain::{CameraDecoder, DecoderStreams, FacingMode, PermissionState, ScannerError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Single camera scanner for one kiosk.
///
/// At most one decoder stream is open at a time. The camera is released by
/// `stop`, by `switch_device`, and when the scanner is dropped.
pub struct Scanner {
    decoder: Arc<dyn CameraDecoder>,
    container_id: String,
    permission: Option<PermissionState>,
    active: Option<FacingMode>,
}

impl Scanner {
    pub fn new(decoder: Arc<dyn CameraDecoder>, container_id: impl Into<String>) -> Self {
        Self {
            decoder,
            container_id: container_id.into(),
            permission: None,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn facing(&self) -> Option<FacingMode> {
        self.active
    }

    pub async fn request_permission(&mut self) -> PermissionState {
        let state = match self.decoder.request_permission().await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "camera permission request failed");
                PermissionState::Denied
            }
        };
        self.permission = Some(state);
        info!(permission = ?state, "camera permission resolved");
        state
    }

    /// Opens the camera; an already open stream is stopped first.
    pub async fn start(&mut self, facing: FacingMode) -> Result<DecoderStreams, ScannerError> {
        match self.permission {
            Some(PermissionState::Granted) => {}
            Some(PermissionState::Denied) => return Err(ScannerError::PermissionDenied),
            None => return Err(ScannerError::PermissionRequired),
        }

        if self.active.is_some() {
            debug!("scanner already active; stopping previous stream");
            self.stop();
        }

        let streams = self.decoder.open(&self.container_id, facing).await?;
        self.active = Some(facing);
        info!(container_id = %self.container_id, facing = facing.as_str(), "scanner started");
        Ok(streams)
    }

    /// Releases the camera. Safe to call when nothing is open.
    pub fn stop(&mut self) {
        if self.active.take().is_some() {
            self.decoder.close();
            info!(container_id = %self.container_id, "scanner stopped");
        }
    }

    pub async fn switch_device(
        &mut self,
        facing: FacingMode,
    ) -> Result<DecoderStreams, ScannerError> {
        self.stop();
        self.start(facing).await
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop();
    }
}
