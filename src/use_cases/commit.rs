// Idempotent check-in commits guarded against duplicate in-flight calls.

use crate::domain::{CheckInGateway, CommitReceipt, KioskError, Participant, RemoteError};
use crate::use_cases::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Result of a single commit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call flipped the participant to checked-in.
    Committed(Participant),
    /// The participant was checked in before; the record is returned unchanged.
    AlreadyCheckedIn(Participant),
    Failed(RemoteError),
    /// A commit for the same participant is in flight; callers drop this silently.
    Conflict,
}

/// Tally of a bulk commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkCommitReport {
    pub success_count: usize,
    pub error_count: usize,
    /// Records returned for successful ids, in request order.
    pub checked_in: Vec<Participant>,
    /// Participant id and reason for each failure, in request order.
    pub failures: Vec<(String, String)>,
}

type InFlight = Arc<Mutex<HashSet<String>>>;
// Check-in time of every commit this service has seen succeed, by participant id.
type Confirmed = Arc<Mutex<HashMap<String, Option<DateTime<Utc>>>>>;

/// Releases a participant id from the in-flight set on every exit path.
struct ProcessingGuard {
    in_flight: InFlight,
    participant_id: String,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.participant_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The guarded collections stay consistent even if a holder panicked mid-insert.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct CheckInCommitService {
    gateway: Arc<dyn CheckInGateway>,
    retry: RetryPolicy,
    in_flight: InFlight,
    confirmed: Confirmed,
}

impl CheckInCommitService {
    pub fn new(gateway: Arc<dyn CheckInGateway>, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            retry,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            confirmed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_processing(&self, participant_id: &str) -> bool {
        lock(&self.in_flight).contains(participant_id)
    }

    fn acquire(&self, participant_id: &str) -> Option<ProcessingGuard> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(participant_id.to_string()) {
            return None;
        }
        Some(ProcessingGuard {
            in_flight: self.in_flight.clone(),
            participant_id: participant_id.to_string(),
        })
    }

    /// Decides whether a successful receipt reflects an earlier check-in.
    ///
    /// The backend flag wins when present. Without it, a check-in time this
    /// service already confirmed, or one stamped before the request started,
    /// marks the participant as previously checked in.
    fn was_already_checked_in(
        &self,
        participant_id: &str,
        receipt: &CommitReceipt,
        started_at: DateTime<Utc>,
    ) -> bool {
        if let Some(flag) = receipt.already_checked_in {
            return flag;
        }

        let check_in_time = receipt.registration.check_in_time;
        let confirmed = lock(&self.confirmed).get(participant_id).copied();
        match (confirmed, check_in_time) {
            (Some(seen), current) if seen == current => true,
            (_, Some(time)) => time < started_at,
            _ => false,
        }
    }

    fn remember(&self, participant_id: &str, registration: &Participant) {
        if registration.checked_in {
            lock(&self.confirmed).insert(participant_id.to_string(), registration.check_in_time);
        }
    }

    pub async fn commit(&self, event_id: &str, participant_id: &str) -> CommitOutcome {
        let Some(_guard) = self.acquire(participant_id) else {
            debug!(participant_id, "commit already in flight; suppressing duplicate");
            return CommitOutcome::Conflict;
        };

        let gateway = &self.gateway;
        let started_at = Utc::now();
        let receipt = match self
            .retry
            .run("check_in", || gateway.check_in(event_id, participant_id))
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(participant_id, error = %err, "check-in failed");
                return CommitOutcome::Failed(err);
            }
        };

        let already = self.was_already_checked_in(participant_id, &receipt, started_at);
        self.remember(participant_id, &receipt.registration);
        if already {
            info!(
                participant_id,
                flagged = receipt.already_checked_in.is_some(),
                "participant was already checked in"
            );
            CommitOutcome::AlreadyCheckedIn(receipt.registration)
        } else {
            info!(
                participant_id,
                check_in_time = ?receipt.registration.check_in_time,
                "participant checked in"
            );
            CommitOutcome::Committed(receipt.registration)
        }
    }

    /// Commits every id independently; one failure never aborts the others.
    ///
    /// Duplicate ids are collapsed so a list never conflicts with itself.
    pub async fn commit_many(&self, event_id: &str, participant_ids: &[String]) -> BulkCommitReport {
        let mut seen = HashSet::new();
        let unique: Vec<&str> = participant_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        let outcomes = join_all(unique.iter().map(|id| self.commit(event_id, id))).await;

        let mut report = BulkCommitReport::default();
        for (id, outcome) in unique.into_iter().zip(outcomes) {
            match outcome {
                CommitOutcome::Committed(participant)
                | CommitOutcome::AlreadyCheckedIn(participant) => {
                    report.success_count += 1;
                    report.checked_in.push(participant);
                }
                CommitOutcome::Failed(err) => {
                    report.error_count += 1;
                    report.failures.push((id.to_string(), err.to_string()));
                }
                CommitOutcome::Conflict => {
                    report.error_count += 1;
                    let conflict = KioskError::CommitConflict {
                        participant_id: id.to_string(),
                    };
                    report.failures.push((id.to_string(), conflict.to_string()));
                }
            }
        }

        info!(
            success_count = report.success_count,
            error_count = report.error_count,
            "bulk check-in finished"
        );
        report
    }
}
