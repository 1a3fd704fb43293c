use chrono::{DateTime, Utc};

// Number of id characters printed on a badge when no short code exists.
const ID_PAYLOAD_LEN: usize = 9;

/// Registration category shown on the badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantType {
    Participant,
    Speaker,
    Exhibitor,
    /// Any other category the registration store uses, kept verbatim.
    Other(String),
}

impl ParticipantType {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "" | "PARTICIPANT" => ParticipantType::Participant,
            "SPEAKER" => ParticipantType::Speaker,
            "EXHIBITOR" => ParticipantType::Exhibitor,
            _ => ParticipantType::Other(label.trim().to_string()),
        }
    }

    pub fn as_label(&self) -> &str {
        match self {
            ParticipantType::Participant => "PARTICIPANT",
            ParticipantType::Speaker => "SPEAKER",
            ParticipantType::Exhibitor => "EXHIBITOR",
            ParticipantType::Other(label) => label,
        }
    }
}

/// Read-mostly snapshot of a registration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub short_code: Option<String>,
    pub qr_code: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub participant_type: ParticipantType,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub checked_in: bool,
    pub check_in_time: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// The exact string encoded in this participant's badge QR code.
    pub fn qr_payload(&self) -> String {
        qr_payload(&self.id, self.short_code.as_deref())
    }
}

/// Selects the QR payload: the short code when present, otherwise the id prefix.
///
/// Badge rendering and scan resolution both go through this function, so a
/// printed badge always re-scans to the participant it was printed for.
pub fn qr_payload(id: &str, short_code: Option<&str>) -> String {
    match short_code.map(str::trim) {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => id.trim().chars().take(ID_PAYLOAD_LEN).collect(),
    }
}

/// Normalizes scanner or keyboard input before it is sent for resolution.
pub fn normalize_code(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
pub(crate) fn sample_participant(id: &str, short_code: Option<&str>) -> Participant {
    Participant {
        id: id.to_string(),
        short_code: short_code.map(str::to_string),
        qr_code: None,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        participant_type: ParticipantType::Speaker,
        company: Some("Analytical Engines".to_string()),
        job_title: None,
        checked_in: false,
        check_in_time: None,
    }
}
