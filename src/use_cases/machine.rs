// Kiosk state machine: owns the check-in session and drives scanner, lookup and commit.

use crate::domain::{
    CheckInSession, DecoderStreams, EventInfo, FacingMode, IntroMode, KioskError, Participant,
    PermissionState, RemoteError, Step, Toast,
};
use crate::use_cases::badge::{BadgeDocument, BadgeRenderer};
use crate::use_cases::commit::{CheckInCommitService, CommitOutcome};
use crate::use_cases::lookup::{LookupOutcome, LookupService, is_searchable};
use crate::use_cases::scanner::Scanner;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

/// User and device input consumed by the kiosk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskEvent {
    ChooseScan,
    ChooseManualSearch,
    BackToOptions,
    SwitchCamera(FacingMode),
    Decoded(String),
    ScanError(String),
    SearchQuery(String),
    /// Manual pick from the search results, by participant id.
    SelectParticipant(String),
    SetTermsAccepted(bool),
    AcceptTerms,
    Confirm,
    Back,
    Reset,
}

/// Messages accepted by the kiosk run loop.
pub enum KioskCommand {
    Event(KioskEvent),
    RenderBadge(oneshot::Sender<Result<BadgeDocument, KioskError>>),
}

/// Result of a background call, tagged with the generation it was issued in.
#[derive(Debug)]
pub enum Completion {
    Lookup {
        generation: u64,
        result: Result<LookupOutcome, RemoteError>,
    },
    Search {
        generation: u64,
        search_seq: u64,
        result: Result<Vec<Participant>, RemoteError>,
    },
    Commit {
        generation: u64,
        outcome: CommitOutcome,
    },
}

pub struct CheckInMachine {
    event: EventInfo,
    lookup: Arc<LookupService>,
    commits: Arc<CheckInCommitService>,
    badges: BadgeRenderer,
    scanner: Scanner,
    facing: FacingMode,
    session: CheckInSession,
    // Bumped on every step change; completions from older generations are stale.
    generation: u64,
    search_seq: u64,
    // In-flight lookup or commit for the current cycle; doubles as the decode debounce.
    pending: Option<JoinHandle<()>>,
    pending_search: Option<JoinHandle<()>>,
    streams: Option<DecoderStreams>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<CheckInSession>,
}

impl CheckInMachine {
    pub fn new(
        event: EventInfo,
        lookup: Arc<LookupService>,
        commits: Arc<CheckInCommitService>,
        badges: BadgeRenderer,
        scanner: Scanner,
    ) -> Self {
        let session = CheckInSession::new();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _snapshot_rx) = watch::channel(session.clone());
        Self {
            event,
            lookup,
            commits,
            badges,
            scanner,
            facing: FacingMode::Environment,
            session,
            generation: 0,
            search_seq: 0,
            pending: None,
            pending_search: None,
            streams: None,
            completions_tx,
            completions_rx,
            snapshot_tx,
        }
    }

    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }

    pub fn session(&self) -> &CheckInSession {
        &self.session
    }

    pub fn step(&self) -> Step {
        self.session.step
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Read-only view of the session, updated after every handled input.
    pub fn subscribe(&self) -> watch::Receiver<CheckInSession> {
        self.snapshot_tx.subscribe()
    }

    /// Drives the kiosk until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<KioskCommand>) {
        let span = info_span!("checkin_kiosk", event_id = %self.event.id);
        async move {
            info!("kiosk ready");
            loop {
                tokio::select! {
                    command = commands.recv() => match command {
                        Some(KioskCommand::Event(event)) => self.dispatch(event).await,
                        Some(KioskCommand::RenderBadge(reply)) => {
                            let _ = reply.send(self.render_badge());
                        }
                        None => break,
                    },
                    Some(event) = next_scan_event(&mut self.streams) => {
                        self.dispatch(event).await;
                    }
                    Some(completion) = self.completions_rx.recv() => {
                        self.apply(completion).await;
                    }
                }
            }
            self.shutdown();
            info!("kiosk stopped");
        }
        .instrument(span)
        .await
    }

    /// Waits for the next background result and applies it. Returns false if none can arrive.
    pub async fn next_completion(&mut self) -> bool {
        if self.pending.is_none() && self.pending_search.is_none() && self.completions_rx.is_empty()
        {
            return false;
        }
        match self.completions_rx.recv().await {
            Some(completion) => {
                self.apply(completion).await;
                true
            }
            None => false,
        }
    }

    pub async fn dispatch(&mut self, event: KioskEvent) {
        self.session.toast = None;
        let step = self.session.step;
        debug!(session_id = %self.session.id, ?step, ?event, "kiosk event");

        match (step, event) {
            (_, KioskEvent::Reset) => self.reset(),
            (Step::Intro(IntroMode::Scanning), KioskEvent::ChooseScan) => {}
            (Step::Intro(_), KioskEvent::ChooseScan) => self.enter_scanning().await,
            (Step::Intro(_), KioskEvent::ChooseManualSearch) => {
                self.transition(Step::Intro(IntroMode::ManualSearch));
            }
            (Step::Intro(_), KioskEvent::BackToOptions) => {
                self.transition(Step::Intro(IntroMode::Options));
            }
            (Step::Intro(IntroMode::Scanning), KioskEvent::SwitchCamera(facing)) => {
                self.switch_camera(facing).await;
            }
            (_, KioskEvent::SwitchCamera(facing)) => self.facing = facing,
            (Step::Intro(IntroMode::Scanning), KioskEvent::Decoded(code)) => {
                if self.pending.is_some() {
                    debug!(code = %code, "lookup in flight; ignoring decode");
                } else {
                    self.start_lookup(code);
                }
            }
            (_, KioskEvent::Decoded(code)) => {
                debug!(code = %code, "decode outside scanning; ignoring");
            }
            (_, KioskEvent::ScanError(reason)) => {
                debug!(reason = %reason, "frame decode failed");
            }
            (Step::Intro(IntroMode::ManualSearch), KioskEvent::SearchQuery(query)) => {
                self.start_search(query);
            }
            (Step::Intro(_), KioskEvent::SelectParticipant(participant_id)) => {
                if self.pending.is_some() {
                    debug!(participant_id = %participant_id, "lookup in flight; ignoring selection");
                } else {
                    self.start_lookup(participant_id);
                }
            }
            (Step::TermsConditions, KioskEvent::SetTermsAccepted(accepted)) => {
                self.session.terms_accepted = accepted;
            }
            (Step::TermsConditions, KioskEvent::AcceptTerms) => {
                if self.session.terms_accepted {
                    self.transition(Step::Confirmation);
                } else {
                    debug!("terms not accepted; staying on terms");
                }
            }
            (Step::TermsConditions, KioskEvent::Back) => {
                self.session.selected_participant = None;
                self.session.terms_accepted = false;
                self.transition(Step::INITIAL);
            }
            (Step::Confirmation, KioskEvent::Confirm) => self.start_commit(),
            (Step::Confirmation, KioskEvent::Back) => {
                if self.pending.is_some() {
                    debug!("commit in flight; ignoring back");
                } else if self.selected_checked_in() {
                    self.transition(Step::AlreadyCheckedIn);
                } else {
                    self.transition(Step::TermsConditions);
                }
            }
            (Step::Intro(mode), KioskEvent::Back) if mode != IntroMode::Options => {
                self.transition(Step::INITIAL);
            }
            (step, event) => {
                debug!(?step, ?event, "event not valid for current step; ignoring");
            }
        }

        self.publish();
    }

    /// Applies a background result if it still belongs to the current step.
    pub async fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Lookup { generation, result } => {
                if generation != self.generation {
                    debug!(generation, current = self.generation, "discarding stale lookup");
                    return;
                }
                self.pending = None;
                self.finish_lookup(result);
            }
            Completion::Search {
                generation,
                search_seq,
                result,
            } => {
                if generation != self.generation || search_seq != self.search_seq {
                    debug!(search_seq, "discarding superseded search");
                    return;
                }
                self.pending_search = None;
                match result {
                    Ok(results) => self.session.search_results = results,
                    Err(err) => self.fail(err.into()),
                }
            }
            Completion::Commit {
                generation,
                outcome,
            } => {
                if generation != self.generation {
                    debug!(generation, "discarding stale commit result");
                    return;
                }
                self.pending = None;
                self.finish_commit(outcome);
            }
        }
        self.publish();
    }

    /// Builds the badge for the current participant; only after check-in.
    pub fn render_badge(&self) -> Result<BadgeDocument, KioskError> {
        match (self.session.step, &self.session.selected_participant) {
            (Step::Success | Step::AlreadyCheckedIn, Some(participant)) => {
                info!(participant_id = %participant.id, "rendering badge");
                Ok(self.badges.render(participant, &self.event))
            }
            _ => Err(KioskError::BadgeNotReady),
        }
    }

    async fn enter_scanning(&mut self) {
        if self.scanner.request_permission().await == PermissionState::Denied {
            warn!("camera permission denied; staying on options");
            self.session.toast = Some(Toast::CameraPermissionDenied);
            self.transition(Step::INITIAL);
            return;
        }

        match self.scanner.start(self.facing).await {
            Ok(streams) => {
                self.transition(Step::Intro(IntroMode::Scanning));
                self.streams = Some(streams);
            }
            Err(err) => {
                warn!(error = %err, "scanner failed to start");
                self.session.toast = Some(Toast::Info(KioskError::from(err).to_string()));
                self.transition(Step::INITIAL);
            }
        }
    }

    async fn switch_camera(&mut self, facing: FacingMode) {
        self.facing = facing;
        self.streams = None;
        match self.scanner.switch_device(facing).await {
            Ok(streams) => self.streams = Some(streams),
            Err(err) => {
                warn!(error = %err, "camera switch failed");
                self.session.toast = Some(Toast::Info(KioskError::from(err).to_string()));
                self.transition(Step::INITIAL);
            }
        }
    }

    fn start_lookup(&mut self, code: String) {
        self.session.scanned_code = Some(code.trim().to_string());
        let lookup = self.lookup.clone();
        let event_id = self.event.id.clone();
        let generation = self.generation;
        let tx = self.completions_tx.clone();
        let span = info_span!("lookup", session_id = %self.session.id, code = %code.trim());
        self.pending = Some(tokio::spawn(
            async move {
                let result = lookup.resolve_by_code(&code, &event_id).await;
                let _ = tx.send(Completion::Lookup { generation, result });
            }
            .instrument(span),
        ));
    }

    fn start_search(&mut self, query: String) {
        self.search_seq += 1;
        if let Some(previous) = self.pending_search.take() {
            previous.abort();
        }
        self.session.search_query = query.clone();

        if !is_searchable(&query) {
            self.session.search_results.clear();
            return;
        }

        let lookup = self.lookup.clone();
        let event_id = self.event.id.clone();
        let generation = self.generation;
        let search_seq = self.search_seq;
        let tx = self.completions_tx.clone();
        self.pending_search = Some(tokio::spawn(
            async move {
                let result = lookup.search(&query, &event_id).await;
                let _ = tx.send(Completion::Search {
                    generation,
                    search_seq,
                    result,
                });
            }
            .in_current_span(),
        ));
    }

    fn start_commit(&mut self) {
        if self.pending.is_some() {
            debug!("commit already in flight; ignoring confirm");
            return;
        }
        if !self.session.terms_accepted {
            debug!("terms not accepted; refusing commit");
            return;
        }
        let Some(participant) = &self.session.selected_participant else {
            return;
        };

        let commits = self.commits.clone();
        let event_id = self.event.id.clone();
        let participant_id = participant.id.clone();
        let generation = self.generation;
        let tx = self.completions_tx.clone();
        let span = info_span!("commit", session_id = %self.session.id, participant_id = %participant_id);
        self.pending = Some(tokio::spawn(
            async move {
                let outcome = commits.commit(&event_id, &participant_id).await;
                let _ = tx.send(Completion::Commit {
                    generation,
                    outcome,
                });
            }
            .instrument(span),
        ));
    }

    fn finish_lookup(&mut self, result: Result<LookupOutcome, RemoteError>) {
        match result {
            Ok(LookupOutcome::Found(participant)) => {
                let checked_in = participant.checked_in;
                self.session.selected_participant = Some(participant);
                self.session.terms_accepted = false;
                if checked_in {
                    self.transition(Step::AlreadyCheckedIn);
                } else {
                    self.transition(Step::TermsConditions);
                }
            }
            Ok(LookupOutcome::NotFound { code }) => {
                self.fail(KioskError::ParticipantNotFound { code });
            }
            Err(err) => self.fail(err.into()),
        }
    }

    fn finish_commit(&mut self, outcome: CommitOutcome) {
        match outcome {
            CommitOutcome::Committed(participant) => {
                self.session.selected_participant = Some(participant);
                self.transition(Step::Success);
            }
            CommitOutcome::AlreadyCheckedIn(participant) => {
                self.session.selected_participant = Some(participant);
                self.transition(Step::AlreadyCheckedIn);
            }
            CommitOutcome::Failed(err) => self.fail(err.into()),
            CommitOutcome::Conflict => {
                let conflict = KioskError::CommitConflict {
                    participant_id: self
                        .session
                        .selected_participant
                        .as_ref()
                        .map(|p| p.id.clone())
                        .unwrap_or_default(),
                };
                debug!(error = %conflict, "duplicate commit suppressed");
            }
        }
    }

    fn fail(&mut self, error: KioskError) {
        warn!(session_id = %self.session.id, error = %error, "check-in cycle failed");
        self.session.last_error = Some(error);
        self.transition(Step::Error);
    }

    fn selected_checked_in(&self) -> bool {
        self.session
            .selected_participant
            .as_ref()
            .is_some_and(|p| p.checked_in)
    }

    // Single place where the step changes; side effects follow the edge taken.
    fn transition(&mut self, next: Step) {
        let previous = self.session.step;
        if previous == next {
            return;
        }

        if previous.is_scanning() {
            self.release_scanner();
        }
        if previous == Step::Intro(IntroMode::ManualSearch) {
            if let Some(search) = self.pending_search.take() {
                search.abort();
            }
            self.session.search_results.clear();
            self.session.search_query.clear();
        }
        if let Some(pending) = self.pending.take() {
            // Best-effort cancellation; a result that still arrives is stale.
            pending.abort();
        }

        self.generation += 1;
        self.session.step = next;
        info!(session_id = %self.session.id, from = ?previous, to = ?next, "step changed");
    }

    fn release_scanner(&mut self) {
        self.streams = None;
        self.scanner.stop();
    }

    fn reset(&mut self) {
        self.release_scanner();
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        if let Some(search) = self.pending_search.take() {
            search.abort();
        }
        self.generation += 1;
        let previous = std::mem::take(&mut self.session);
        info!(previous_session = %previous.id, session_id = %self.session.id, "session reset");
    }

    fn shutdown(&mut self) {
        self.release_scanner();
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        if let Some(search) = self.pending_search.take() {
            search.abort();
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.clone());
    }
}

// Decoded text and frame errors from the open camera, whichever arrives first.
async fn next_scan_event(streams: &mut Option<DecoderStreams>) -> Option<KioskEvent> {
    let Some(streams) = streams else {
        return std::future::pending().await;
    };
    tokio::select! {
        Some(code) = streams.decoded.recv() => Some(KioskEvent::Decoded(code)),
        Some(reason) = streams.errors.recv() => Some(KioskEvent::ScanError(reason)),
        else => None,
    }
}
