use std::fmt;

// Domain-level errors for the check-in workflow.

/// Failure reported by a port implementation for a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure or a retryable upstream status (408, 429, 5xx).
    Transient(String),
    /// Definitive upstream answer that a retry will not change.
    Rejected { status: Option<u16>, message: String },
    /// The upstream answered but the body could not be understood.
    Malformed(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Transient(reason) => write!(f, "transient upstream failure: {reason}"),
            GatewayError::Rejected {
                status: Some(status),
                message,
            } => write!(f, "upstream rejected request ({status}): {message}"),
            GatewayError::Rejected {
                status: None,
                message,
            } => write!(f, "upstream rejected request: {message}"),
            GatewayError::Malformed(reason) => write!(f, "malformed upstream response: {reason}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Outcome of a remote call after the retry policy has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Every attempt failed transiently.
    Transient { attempts: u32, reason: String },
    /// The call was answered definitively and not retried.
    Rejected { reason: String },
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transient { attempts, reason } => {
                write!(f, "network unavailable after {attempts} attempts: {reason}")
            }
            RemoteError::Rejected { reason } => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Camera and decoder failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannerError {
    PermissionDenied,
    /// `start` was called before permission was granted.
    PermissionRequired,
    Device(String),
}

impl fmt::Display for ScannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerError::PermissionDenied => write!(f, "camera permission denied"),
            ScannerError::PermissionRequired => {
                write!(f, "camera permission must be granted before scanning")
            }
            ScannerError::Device(reason) => write!(f, "camera error: {reason}"),
        }
    }
}

impl std::error::Error for ScannerError {}

/// User-facing failure attached to a kiosk session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskError {
    CameraPermissionDenied,
    Camera { reason: String },
    ParticipantNotFound { code: String },
    NetworkTransient { attempts: u32, reason: String },
    Rejected { reason: String },
    /// A commit for this participant is already in flight; never shown to the user.
    CommitConflict { participant_id: String },
    /// Badge requested outside the success or already-checked-in screens.
    BadgeNotReady,
}

impl KioskError {
    /// Hints displayed next to the error message.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            KioskError::ParticipantNotFound { .. } => &[
                "Make sure the QR code is clean and fully visible to the camera.",
                "Try the manual search with the participant's name or email.",
            ],
            KioskError::CameraPermissionDenied | KioskError::Camera { .. } => {
                &["Use the manual search instead of the camera."]
            }
            KioskError::NetworkTransient { .. } => &["Check the kiosk network connection and retry."],
            _ => &[],
        }
    }
}

impl fmt::Display for KioskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KioskError::CameraPermissionDenied => write!(f, "camera access was denied"),
            KioskError::Camera { reason } => write!(f, "camera unavailable: {reason}"),
            KioskError::ParticipantNotFound { code } => {
                write!(f, "no participant found for code \"{code}\"")
            }
            KioskError::NetworkTransient { attempts, reason } => write!(
                f,
                "the registration service is unreachable ({attempts} attempts): {reason}"
            ),
            KioskError::Rejected { reason } => write!(f, "check-in failed: {reason}"),
            KioskError::CommitConflict { participant_id } => {
                write!(f, "check-in already in progress for {participant_id}")
            }
            KioskError::BadgeNotReady => write!(f, "badge is only available after check-in"),
        }
    }
}

impl std::error::Error for KioskError {}

impl From<RemoteError> for KioskError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transient { attempts, reason } => {
                KioskError::NetworkTransient { attempts, reason }
            }
            RemoteError::Rejected { reason } => KioskError::Rejected { reason },
        }
    }
}

impl From<ScannerError> for KioskError {
    fn from(err: ScannerError) -> Self {
        match err {
            ScannerError::PermissionDenied | ScannerError::PermissionRequired => {
                KioskError::CameraPermissionDenied
            }
            ScannerError::Device(reason) => KioskError::Camera { reason },
        }
    }
}
