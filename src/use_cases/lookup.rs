// Participant resolution for scanned codes and the manual search box.

use crate::domain::{LookupReply, Participant, ParticipantDirectory, RemoteError, normalize_code};
use crate::use_cases::retry::RetryPolicy;
use std::sync::Arc;
use tracing::{debug, info};

/// Queries shorter than this never reach the network.
pub const MIN_SEARCH_LEN: usize = 2;

/// Result of resolving a single code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(Participant),
    /// Definitive miss; carries the normalized input code.
    NotFound { code: String },
}

/// Resolves codes and search queries through the directory port with retries.
#[derive(Clone)]
pub struct LookupService {
    directory: Arc<dyn ParticipantDirectory>,
    retry: RetryPolicy,
}

impl LookupService {
    pub fn new(directory: Arc<dyn ParticipantDirectory>, retry: RetryPolicy) -> Self {
        Self { directory, retry }
    }

    pub async fn resolve_by_code(
        &self,
        code: &str,
        event_id: &str,
    ) -> Result<LookupOutcome, RemoteError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(LookupOutcome::NotFound {
                code: String::new(),
            });
        }

        let directory = &self.directory;
        let reply = self
            .retry
            .run("lookup", || directory.lookup(code, event_id))
            .await?;

        match reply {
            LookupReply::Found(participant) => {
                info!(
                    code,
                    participant_id = %participant.id,
                    checked_in = participant.checked_in,
                    "participant resolved"
                );
                Ok(LookupOutcome::Found(participant))
            }
            LookupReply::NotFound { message } => {
                info!(code, message = message.as_deref().unwrap_or(""), "code not found");
                Ok(LookupOutcome::NotFound {
                    code: code.to_string(),
                })
            }
        }
    }

    /// Free-text search; results keep the order the directory returns.
    pub async fn search(
        &self,
        query: &str,
        event_id: &str,
    ) -> Result<Vec<Participant>, RemoteError> {
        let query = query.trim();
        if !is_searchable(query) {
            debug!(query, "query below minimum length; skipping request");
            return Ok(Vec::new());
        }

        let directory = &self.directory;
        let results = self
            .retry
            .run("search", || directory.search(query, event_id))
            .await?;
        debug!(query, hits = results.len(), "search completed");
        Ok(results)
    }
}

pub fn is_searchable(query: &str) -> bool {
    query.trim().chars().count() >= MIN_SEARCH_LEN
}
