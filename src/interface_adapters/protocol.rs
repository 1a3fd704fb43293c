// Wire DTOs for the registration backend (camelCase JSON).

use crate::domain::{Participant, ParticipantType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "type", default)]
    pub participant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default)]
    pub checked_in: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in_time: Option<DateTime<Utc>>,
}

impl From<ParticipantDto> for Participant {
    fn from(dto: ParticipantDto) -> Self {
        Participant {
            id: dto.id,
            short_code: dto.short_code.filter(|code| !code.trim().is_empty()),
            qr_code: dto.qr_code.filter(|code| !code.trim().is_empty()),
            first_name: dto.first_name,
            last_name: dto.last_name,
            email: dto.email,
            participant_type: ParticipantType::from_label(
                dto.participant_type.as_deref().unwrap_or_default(),
            ),
            company: dto.company,
            job_title: dto.job_title,
            checked_in: dto.checked_in,
            check_in_time: dto.check_in_time,
        }
    }
}

impl From<&Participant> for ParticipantDto {
    fn from(participant: &Participant) -> Self {
        ParticipantDto {
            id: participant.id.clone(),
            short_code: participant.short_code.clone(),
            qr_code: participant.qr_code.clone(),
            first_name: participant.first_name.clone(),
            last_name: participant.last_name.clone(),
            email: participant.email.clone(),
            participant_type: Some(participant.participant_type.as_label().to_string()),
            company: participant.company.clone(),
            job_title: participant.job_title.clone(),
            checked_in: participant.checked_in,
            check_in_time: participant.check_in_time,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest<'a> {
    pub code: &'a str,
    pub event_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    #[serde(default)]
    pub participant: Option<ParticipantDto>,
    #[serde(default)]
    pub not_found: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<ParticipantDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest<'a> {
    pub event_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub registration: ParticipantDto,
    #[serde(default)]
    pub already_checked_in: Option<bool>,
}

// Error envelope returned by the backend on failures.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
