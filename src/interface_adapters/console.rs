// Line-oriented operator console: commands drive the kiosk, anything else is wedge input.

use crate::domain::{CheckInSession, FacingMode, IntroMode, KioskError, Step, Toast};
use crate::interface_adapters::wedge::WedgeDecoder;
use crate::use_cases::{BadgeDocument, CheckInCommitService, KioskCommand, KioskEvent};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

const HELP: &str = "\
commands:
  scan                        start the scanner, then scan or type a code
  search [query]              manual search (at least 2 characters)
  select <participant id>     pick a search result
  terms on|off                tick or untick the terms checkbox
  accept                      continue past the terms
  confirm                     check the participant in
  back                        previous screen
  options                     back to the intro options
  reset                       start over
  camera user|environment     switch camera
  print                       save the badge of the checked-in participant
  bulk <id> [<id>...]         check several participants in at once
  help                        this text
  quit                        stop the kiosk";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Scan,
    /// Empty query only switches to the manual search screen.
    Search(String),
    Select(String),
    Terms(bool),
    Accept,
    Confirm,
    Back,
    Options,
    Reset,
    Camera(FacingMode),
    Print,
    Bulk(Vec<String>),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Blank,
    Command(ConsoleCommand),
    /// Text typed by a keyboard-wedge reader.
    Scanned(String),
    /// A known command with bad arguments; carries the usage line.
    Invalid(&'static str),
}

pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Blank;
    }

    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };

    let command = match keyword.to_ascii_lowercase().as_str() {
        "scan" => ConsoleCommand::Scan,
        "search" => ConsoleCommand::Search(rest.to_string()),
        "select" if !rest.is_empty() => ConsoleCommand::Select(rest.to_string()),
        "select" => return ParsedLine::Invalid("usage: select <participant id>"),
        "terms" => match rest.to_ascii_lowercase().as_str() {
            "on" | "yes" => ConsoleCommand::Terms(true),
            "off" | "no" => ConsoleCommand::Terms(false),
            _ => return ParsedLine::Invalid("usage: terms on|off"),
        },
        "accept" => ConsoleCommand::Accept,
        "confirm" => ConsoleCommand::Confirm,
        "back" => ConsoleCommand::Back,
        "options" => ConsoleCommand::Options,
        "reset" => ConsoleCommand::Reset,
        "camera" => match rest.to_ascii_lowercase().as_str() {
            "user" => ConsoleCommand::Camera(FacingMode::User),
            "environment" => ConsoleCommand::Camera(FacingMode::Environment),
            _ => return ParsedLine::Invalid("usage: camera user|environment"),
        },
        "print" => ConsoleCommand::Print,
        "bulk" => {
            let ids: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if ids.is_empty() {
                return ParsedLine::Invalid("usage: bulk <id> [<id>...]");
            }
            ConsoleCommand::Bulk(ids)
        }
        "help" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        _ => return ParsedLine::Scanned(line.to_string()),
    };

    ParsedLine::Command(command)
}

fn step_label(step: Step) -> &'static str {
    match step {
        Step::Intro(IntroMode::Options) => "welcome",
        Step::Intro(IntroMode::Scanning) => "scanning",
        Step::Intro(IntroMode::ManualSearch) => "manual search",
        Step::TermsConditions => "terms and conditions",
        Step::Confirmation => "confirmation",
        Step::Success => "checked in",
        Step::Error => "error",
        Step::AlreadyCheckedIn => "already checked in",
    }
}

/// Operator-facing rendering of the current session.
pub fn describe(session: &CheckInSession) -> String {
    let mut lines = vec![format!("[{}]", step_label(session.step))];
    let name = session
        .selected_participant
        .as_ref()
        .map(|p| p.full_name())
        .unwrap_or_default();

    match session.step {
        Step::Intro(IntroMode::Options) => {
            lines.push("type `scan` or `search` to begin".to_string());
        }
        Step::Intro(IntroMode::Scanning) => {
            lines.push("waiting for a QR code".to_string());
        }
        Step::Intro(IntroMode::ManualSearch) => {
            if session.search_results.is_empty() && !session.search_query.is_empty() {
                lines.push(format!("no results for \"{}\"", session.search_query));
            }
            for participant in &session.search_results {
                lines.push(format!(
                    "  {}  {} <{}>",
                    participant.id,
                    participant.full_name(),
                    participant.email
                ));
            }
        }
        Step::TermsConditions => {
            let ticked = if session.terms_accepted { "x" } else { " " };
            lines.push(format!("{name}: [{ticked}] I accept the terms and conditions"));
        }
        Step::Confirmation => lines.push(format!("confirm check-in for {name}")),
        Step::Success => lines.push(format!("{name} is checked in; `print` saves the badge")),
        Step::AlreadyCheckedIn => {
            let at = session
                .selected_participant
                .as_ref()
                .and_then(|p| p.check_in_time)
                .map(|time| format!(" at {}", time.format("%Y-%m-%d %H:%M")))
                .unwrap_or_default();
            lines.push(format!("{name} was already checked in{at}"));
        }
        Step::Error => {
            if let Some(error) = &session.last_error {
                lines.push(error.to_string());
                for hint in error.suggestions() {
                    lines.push(format!("  - {hint}"));
                }
            }
            // A not-found error already quotes the code.
            let quoted = matches!(
                session.last_error,
                Some(KioskError::ParticipantNotFound { .. })
            );
            if let Some(code) = session.scanned_code.as_deref().filter(|_| !quoted) {
                lines.push(format!("last code: {code}"));
            }
        }
    }

    if session.step.is_terminal() {
        lines.push("type `reset` for the next participant".to_string());
    }

    match &session.toast {
        Some(Toast::CameraPermissionDenied) => {
            lines.push("! camera permission denied; use manual search".to_string());
        }
        Some(Toast::Info(message)) => lines.push(format!("! {message}")),
        None => {}
    }

    lines.join("\n")
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn kiosk_stopped() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "kiosk stopped")
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

pub struct Console {
    commands: mpsc::Sender<KioskCommand>,
    wedge: Arc<WedgeDecoder>,
    commits: Arc<CheckInCommitService>,
    event_id: String,
    badge_dir: PathBuf,
}

impl Console {
    pub fn new(
        commands: mpsc::Sender<KioskCommand>,
        wedge: Arc<WedgeDecoder>,
        commits: Arc<CheckInCommitService>,
        event_id: impl Into<String>,
        badge_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            commands,
            wedge,
            commits,
            event_id: event_id.into(),
            badge_dir: badge_dir.into(),
        }
    }

    /// Reads operator input until EOF or `quit`, echoing session changes as they happen.
    pub async fn run<R, W>(
        &self,
        input: R,
        mut output: W,
        mut snapshots: watch::Receiver<CheckInSession>,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut last_status = String::new();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if self.handle_line(&line, &mut output).await? == Flow::Quit {
                        break;
                    }
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = describe(&snapshots.borrow_and_update());
                    if status != last_status {
                        write_line(&mut output, &status).await?;
                        last_status = status;
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_line<W: AsyncWrite + Unpin>(
        &self,
        line: &str,
        output: &mut W,
    ) -> io::Result<Flow> {
        match parse_line(line) {
            ParsedLine::Blank => {}
            ParsedLine::Invalid(usage) => write_line(output, usage).await?,
            ParsedLine::Scanned(code) => {
                if !self.wedge.feed(&code) {
                    write_line(output, "scanner is off; type `scan` first (or `help`)").await?;
                }
            }
            ParsedLine::Command(command) => return self.execute(command, output).await,
        }
        Ok(Flow::Continue)
    }

    async fn execute<W: AsyncWrite + Unpin>(
        &self,
        command: ConsoleCommand,
        output: &mut W,
    ) -> io::Result<Flow> {
        let event = match command {
            ConsoleCommand::Scan => KioskEvent::ChooseScan,
            ConsoleCommand::Search(query) => {
                self.send(KioskEvent::ChooseManualSearch).await?;
                if query.is_empty() {
                    return Ok(Flow::Continue);
                }
                KioskEvent::SearchQuery(query)
            }
            ConsoleCommand::Select(participant_id) => KioskEvent::SelectParticipant(participant_id),
            ConsoleCommand::Terms(accepted) => KioskEvent::SetTermsAccepted(accepted),
            ConsoleCommand::Accept => KioskEvent::AcceptTerms,
            ConsoleCommand::Confirm => KioskEvent::Confirm,
            ConsoleCommand::Back => KioskEvent::Back,
            ConsoleCommand::Options => KioskEvent::BackToOptions,
            ConsoleCommand::Reset => KioskEvent::Reset,
            ConsoleCommand::Camera(facing) => KioskEvent::SwitchCamera(facing),
            ConsoleCommand::Print => {
                self.print_badge(output).await?;
                return Ok(Flow::Continue);
            }
            ConsoleCommand::Bulk(participant_ids) => {
                self.bulk(&participant_ids, output).await?;
                return Ok(Flow::Continue);
            }
            ConsoleCommand::Help => {
                write_line(output, HELP).await?;
                return Ok(Flow::Continue);
            }
            ConsoleCommand::Quit => return Ok(Flow::Quit),
        };

        self.send(event).await?;
        Ok(Flow::Continue)
    }

    async fn send(&self, event: KioskEvent) -> io::Result<()> {
        self.commands
            .send(KioskCommand::Event(event))
            .await
            .map_err(|_| kiosk_stopped())
    }

    async fn print_badge<W: AsyncWrite + Unpin>(&self, output: &mut W) -> io::Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(KioskCommand::RenderBadge(reply_tx))
            .await
            .map_err(|_| kiosk_stopped())?;

        let badge = match reply_rx.await.map_err(|_| kiosk_stopped())? {
            Ok(badge) => badge,
            Err(err) => return write_line(output, &err.to_string()).await,
        };

        match save_badge(&self.badge_dir, &badge).await {
            Ok(paths) => {
                for path in paths {
                    write_line(output, &format!("badge saved to {}", path.display())).await?;
                }
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, dir = %self.badge_dir.display(), "failed to save badge");
                write_line(output, &format!("could not save badge: {err}")).await
            }
        }
    }

    async fn bulk<W: AsyncWrite + Unpin>(
        &self,
        participant_ids: &[String],
        output: &mut W,
    ) -> io::Result<()> {
        let report = self
            .commits
            .commit_many(&self.event_id, participant_ids)
            .await;

        write_line(
            output,
            &format!(
                "bulk check-in: {} succeeded, {} failed",
                report.success_count, report.error_count
            ),
        )
        .await?;
        for (participant_id, reason) in &report.failures {
            write_line(output, &format!("  {participant_id}: {reason}")).await?;
        }
        Ok(())
    }
}

// Writes the print page and the PNG QR into `dir`, returning both paths.
async fn save_badge(dir: &Path, badge: &BadgeDocument) -> io::Result<Vec<PathBuf>> {
    let image = badge.raster().map_err(io::Error::other)?;
    tokio::fs::create_dir_all(dir).await?;

    let html_path = dir.join(badge.print_file_name());
    tokio::fs::write(&html_path, badge.print_html()).await?;
    let png_path = dir.join(&image.file_name);
    tokio::fs::write(&png_path, &image.png).await?;

    info!(html = %html_path.display(), png = %png_path.display(), "badge saved");
    Ok(vec![html_path, png_path])
}
