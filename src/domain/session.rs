use uuid::Uuid;

use crate::domain::errors::KioskError;
use crate::domain::participant::Participant;

/// Sub-modes of the intro screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroMode {
    Options,
    Scanning,
    ManualSearch,
}

/// Closed set of kiosk steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Intro(IntroMode),
    TermsConditions,
    Confirmation,
    Success,
    Error,
    AlreadyCheckedIn,
}

impl Step {
    pub const INITIAL: Step = Step::Intro(IntroMode::Options);

    /// Success, Error and AlreadyCheckedIn end the current cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Step::Success | Step::Error | Step::AlreadyCheckedIn)
    }

    pub fn is_scanning(self) -> bool {
        self == Step::Intro(IntroMode::Scanning)
    }
}

/// Short-lived notice shown on top of the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toast {
    CameraPermissionDenied,
    Info(String),
}

/// State of one kiosk interaction; owned and mutated only by the state machine.
#[derive(Debug, Clone)]
pub struct CheckInSession {
    pub id: String,
    pub step: Step,
    pub selected_participant: Option<Participant>,
    pub terms_accepted: bool,
    pub last_error: Option<KioskError>,
    // Last code sent for resolution, quoted by not-found errors.
    pub scanned_code: Option<String>,
    pub search_query: String,
    pub search_results: Vec<Participant>,
    pub toast: Option<Toast>,
}

impl CheckInSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step: Step::INITIAL,
            selected_participant: None,
            terms_accepted: false,
            last_error: None,
            scanned_code: None,
            search_query: String::new(),
            search_results: Vec::new(),
            toast: None,
        }
    }
}

impl Default for CheckInSession {
    fn default() -> Self {
        Self::new()
    }
}
