// Domain layer: participant model, kiosk session state and ports.

pub mod errors;
pub mod event;
pub mod participant;
pub mod ports;
pub mod session;

pub use errors::{GatewayError, KioskError, RemoteError, ScannerError};
pub use event::EventInfo;
pub use participant::{Participant, ParticipantType, normalize_code, qr_payload};
pub use ports::{
    CameraDecoder, CheckInGateway, CommitReceipt, DecoderStreams, FacingMode, LookupReply,
    ParticipantDirectory, PermissionState,
};
pub use session::{CheckInSession, IntroMode, Step, Toast};
