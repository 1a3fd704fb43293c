use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::domain::{
    CameraDecoder, CheckInGateway, CommitReceipt, DecoderStreams, FacingMode, GatewayError,
    LookupReply, Participant, ParticipantDirectory, PermissionState, ScannerError, normalize_code,
};

// Resolves a scanned code the way the registration backend does.
pub(crate) fn matches_code(participant: &Participant, code: &str) -> bool {
    let code = normalize_code(code);
    if code.is_empty() {
        return false;
    }

    participant.id == code
        || participant.short_code.as_deref() == Some(code)
        || participant.qr_code.as_deref() == Some(code)
        || participant.qr_payload() == code
}

// Directory double that resolves codes the way the registration backend does.
pub(crate) struct FakeDirectory {
    participants: Mutex<Vec<Participant>>,
    // Errors returned, in order, before the directory starts answering.
    failures: Mutex<VecDeque<GatewayError>>,
    lookup_codes: Mutex<Vec<String>>,
    lookup_times: Mutex<Vec<Instant>>,
    searches: AtomicUsize,
}

impl FakeDirectory {
    pub(crate) fn with(participants: Vec<Participant>) -> Self {
        Self {
            participants: Mutex::new(participants),
            failures: Mutex::new(VecDeque::new()),
            lookup_codes: Mutex::new(Vec::new()),
            lookup_times: Mutex::new(Vec::new()),
            searches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fail_next(&self, failures: Vec<GatewayError>) {
        let mut guard = self.failures.lock().expect("failures mutex poisoned");
        guard.extend(failures);
    }

    pub(crate) fn lookup_calls(&self) -> usize {
        self.lookup_codes.lock().expect("codes mutex poisoned").len()
    }

    pub(crate) fn lookup_codes(&self) -> Vec<String> {
        self.lookup_codes.lock().expect("codes mutex poisoned").clone()
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    // Time between consecutive lookup calls.
    pub(crate) fn call_gaps(&self) -> Vec<Duration> {
        let times = self.lookup_times.lock().expect("times mutex poisoned");
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    fn next_failure(&self) -> Option<GatewayError> {
        self.failures
            .lock()
            .expect("failures mutex poisoned")
            .pop_front()
    }
}

#[async_trait]
impl ParticipantDirectory for FakeDirectory {
    async fn lookup(&self, code: &str, _event_id: &str) -> Result<LookupReply, GatewayError> {
        self.lookup_codes
            .lock()
            .expect("codes mutex poisoned")
            .push(code.to_string());
        self.lookup_times
            .lock()
            .expect("times mutex poisoned")
            .push(Instant::now());

        if let Some(err) = self.next_failure() {
            return Err(err);
        }

        let participants = self.participants.lock().expect("participants mutex poisoned");
        Ok(participants
            .iter()
            .find(|p| matches_code(p, code))
            .cloned()
            .map(LookupReply::Found)
            .unwrap_or(LookupReply::NotFound {
                message: Some("participant not found".to_string()),
            }))
    }

    async fn search(&self, query: &str, _event_id: &str) -> Result<Vec<Participant>, GatewayError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_failure() {
            return Err(err);
        }

        let needle = query.to_lowercase();
        let participants = self.participants.lock().expect("participants mutex poisoned");
        Ok(participants
            .iter()
            .filter(|p| {
                p.full_name().to_lowercase().contains(&needle)
                    || p.email.to_lowercase().contains(&needle)
                    || p.id.contains(query)
            })
            .cloned()
            .collect())
    }
}

// Gateway double with the backend's idempotent check-in semantics.
pub(crate) struct FakeGateway {
    registrations: Mutex<HashMap<String, Participant>>,
    rejected: Mutex<HashSet<String>>,
    transient_failures: AtomicUsize,
    // Answer like a backend that never sends the alreadyCheckedIn flag.
    omit_flag: AtomicBool,
    calls: AtomicUsize,
    flips: AtomicUsize,
}

impl FakeGateway {
    pub(crate) fn with(participants: Vec<Participant>) -> Self {
        Self {
            registrations: Mutex::new(
                participants
                    .into_iter()
                    .map(|p| (p.id.clone(), p))
                    .collect(),
            ),
            rejected: Mutex::new(HashSet::new()),
            transient_failures: AtomicUsize::new(0),
            omit_flag: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            flips: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reject(&self, participant_id: &str) {
        self.rejected
            .lock()
            .expect("rejected mutex poisoned")
            .insert(participant_id.to_string());
    }

    pub(crate) fn fail_transiently(&self, times: usize) {
        self.transient_failures.store(times, Ordering::SeqCst);
    }

    pub(crate) fn omit_flag(&self) {
        self.omit_flag.store(true, Ordering::SeqCst);
    }

    fn flag(&self, already_checked_in: bool) -> Option<bool> {
        (!self.omit_flag.load(Ordering::SeqCst)).then_some(already_checked_in)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn flips(&self) -> usize {
        self.flips.load(Ordering::SeqCst)
    }

    pub(crate) fn participant(&self, participant_id: &str) -> Option<Participant> {
        self.registrations
            .lock()
            .expect("registrations mutex poisoned")
            .get(participant_id)
            .cloned()
    }
}

#[async_trait]
impl CheckInGateway for FakeGateway {
    async fn check_in(
        &self,
        _event_id: &str,
        participant_id: &str,
    ) -> Result<CommitReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers interleave like a real network round-trip.
        tokio::task::yield_now().await;

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(GatewayError::Transient("503 service unavailable".to_string()));
        }

        if self
            .rejected
            .lock()
            .expect("rejected mutex poisoned")
            .contains(participant_id)
        {
            return Err(GatewayError::Rejected {
                status: Some(422),
                message: "registration cannot be checked in".to_string(),
            });
        }

        let mut registrations = self.registrations.lock().expect("registrations mutex poisoned");
        let Some(registration) = registrations.get_mut(participant_id) else {
            return Err(GatewayError::Rejected {
                status: Some(404),
                message: "registration not found".to_string(),
            });
        };

        if registration.checked_in {
            return Ok(CommitReceipt {
                registration: registration.clone(),
                already_checked_in: self.flag(true),
            });
        }

        registration.checked_in = true;
        registration.check_in_time = Some(Utc::now());
        self.flips.fetch_add(1, Ordering::SeqCst);
        Ok(CommitReceipt {
            registration: registration.clone(),
            already_checked_in: self.flag(false),
        })
    }
}

#[derive(Default)]
struct DecoderFeed {
    decoded: Option<mpsc::Sender<String>>,
    errors: Option<mpsc::Sender<String>>,
}

// Camera double that counts device opens/closes and lets tests inject frames.
pub(crate) struct FakeDecoder {
    permission: PermissionState,
    opens: AtomicUsize,
    closes: AtomicUsize,
    facings: Mutex<Vec<FacingMode>>,
    feed: Mutex<DecoderFeed>,
}

impl FakeDecoder {
    pub(crate) fn granting() -> Self {
        Self::with_permission(PermissionState::Granted)
    }

    pub(crate) fn denying() -> Self {
        Self::with_permission(PermissionState::Denied)
    }

    fn with_permission(permission: PermissionState) -> Self {
        Self {
            permission,
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            facings: Mutex::new(Vec::new()),
            feed: Mutex::new(DecoderFeed::default()),
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn facings(&self) -> Vec<FacingMode> {
        self.facings.lock().expect("facings mutex poisoned").clone()
    }

    // Pushes a decoded frame; false when the camera is closed.
    pub(crate) fn emit(&self, text: &str) -> bool {
        let feed = self.feed.lock().expect("feed mutex poisoned");
        feed.decoded
            .as_ref()
            .is_some_and(|tx| tx.try_send(text.to_string()).is_ok())
    }

    pub(crate) fn emit_error(&self, text: &str) -> bool {
        let feed = self.feed.lock().expect("feed mutex poisoned");
        feed.errors
            .as_ref()
            .is_some_and(|tx| tx.try_send(text.to_string()).is_ok())
    }
}

#[async_trait]
impl CameraDecoder for FakeDecoder {
    async fn request_permission(&self) -> Result<PermissionState, ScannerError> {
        Ok(self.permission)
    }

    async fn open(
        &self,
        _container_id: &str,
        facing: FacingMode,
    ) -> Result<DecoderStreams, ScannerError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.facings
            .lock()
            .expect("facings mutex poisoned")
            .push(facing);

        let (decoded_tx, decoded) = mpsc::channel(16);
        let (errors_tx, errors) = mpsc::channel(16);
        let mut feed = self.feed.lock().expect("feed mutex poisoned");
        feed.decoded = Some(decoded_tx);
        feed.errors = Some(errors_tx);
        Ok(DecoderStreams { decoded, errors })
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let mut feed = self.feed.lock().expect("feed mutex poisoned");
        feed.decoded = None;
        feed.errors = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::participant::sample_participant;

    #[test]
    fn when_code_has_scanner_whitespace_then_it_still_matches() {
        let participant = sample_participant("c0ffee-1234-5678", Some("A1B2C3"));

        assert!(matches_code(&participant, " A1B2C3\r\n"));
        assert!(matches_code(&participant, "c0ffee-1234-5678"));
        assert!(!matches_code(&participant, "c0ffee-12"));
        assert!(!matches_code(&participant, ""));
    }

    #[test]
    fn when_no_short_code_then_id_prefix_resolves_participant() {
        let participant = sample_participant("c0ffee-1234-5678", None);

        assert!(matches_code(&participant, "c0ffee-12"));
    }
}
