// Badge documents and their three presentations (preview, raster, print).

use crate::domain::{EventInfo, Participant, ParticipantType};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use qrcode::render::svg;
use std::fmt;
use std::io::Cursor;
use url::Url;

/// Physical print size of a badge.
pub const BADGE_WIDTH_CM: f32 = 9.5;
pub const BADGE_HEIGHT_CM: f32 = 13.0;

const PREVIEW_QR_PX: u32 = 200;
const RASTER_QR_PX: u32 = 512;
const PRINT_QR_PX: u32 = 300;

#[derive(Debug)]
pub enum BadgeError {
    Encode(qrcode::types::QrError),
    Raster(image::ImageError),
}

impl fmt::Display for BadgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadgeError::Encode(err) => write!(f, "QR encoding failed: {err}"),
            BadgeError::Raster(err) => write!(f, "badge image encoding failed: {err}"),
        }
    }
}

impl std::error::Error for BadgeError {}

/// Everything printed on a badge, resolved once from participant and event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeDocument {
    pub event_name: String,
    pub banner_url: Option<String>,
    pub full_name: String,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub participant_type: ParticipantType,
    /// Exact string encoded in the QR code; also printed beneath it.
    pub qr_payload: String,
    /// External rendering of the QR payload used by the print layout.
    pub qr_image_url: String,
}

/// Downloadable raster badge.
#[derive(Debug, Clone)]
pub struct BadgeImage {
    pub file_name: String,
    pub png: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BadgeRenderer {
    qr_service: Url,
}

impl BadgeRenderer {
    /// `qr_service` is the external endpoint that renders QR images for printing.
    pub fn new(qr_service: Url) -> Self {
        Self { qr_service }
    }

    pub fn render(&self, participant: &Participant, event: &EventInfo) -> BadgeDocument {
        let qr_payload = participant.qr_payload();

        let mut qr_image_url = self.qr_service.clone();
        qr_image_url
            .query_pairs_mut()
            .append_pair("size", &format!("{PRINT_QR_PX}x{PRINT_QR_PX}"))
            .append_pair("data", &qr_payload);

        BadgeDocument {
            event_name: event.name.clone(),
            banner_url: event.banner_url.clone(),
            full_name: participant.full_name(),
            company: non_empty(participant.company.as_deref()),
            job_title: non_empty(participant.job_title.as_deref()),
            participant_type: participant.participant_type.clone(),
            qr_payload,
            qr_image_url: qr_image_url.to_string(),
        }
    }
}

impl BadgeDocument {
    fn qr(&self) -> Result<QrCode, BadgeError> {
        QrCode::new(self.qr_payload.as_bytes()).map_err(BadgeError::Encode)
    }

    /// On-screen badge fragment with an inline SVG QR code.
    pub fn preview_html(&self) -> Result<String, BadgeError> {
        let qr_svg = self
            .qr()?
            .render::<svg::Color>()
            .min_dimensions(PREVIEW_QR_PX, PREVIEW_QR_PX)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();

        Ok(format!(
            "<div class=\"badge-preview\">{body}<div class=\"badge-qr\">{qr_svg}</div>{code}</div>",
            body = self.body_html(),
            code = self.code_html(),
        ))
    }

    /// PNG rendering of the badge QR code for download.
    pub fn raster(&self) -> Result<BadgeImage, BadgeError> {
        let image = self
            .qr()?
            .render::<Luma<u8>>()
            .min_dimensions(RASTER_QR_PX, RASTER_QR_PX)
            .build();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(BadgeError::Raster)?;

        Ok(BadgeImage {
            file_name: format!("badge-{}.png", file_stem(&self.qr_payload)),
            png,
        })
    }

    /// Standalone print page at the fixed badge size; prints and closes itself on load.
    pub fn print_html(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Badge - {title}</title>
<style>
@page {{ size: {w}cm {h}cm; margin: 0; }}
html, body {{ margin: 0; padding: 0; }}
.badge {{ width: {w}cm; height: {h}cm; box-sizing: border-box; padding: 0.5cm; font-family: sans-serif; text-align: center; overflow: hidden; }}
.badge-banner img {{ max-width: 100%; max-height: 2.5cm; }}
.badge-event {{ font-size: 14pt; font-weight: bold; margin-bottom: 0.4cm; }}
.badge-name {{ font-size: 20pt; font-weight: bold; }}
.badge-company, .badge-title {{ font-size: 11pt; }}
.badge-type {{ font-size: 9pt; letter-spacing: 0.1em; margin-top: 0.2cm; }}
.badge-qr img {{ width: 4.5cm; height: 4.5cm; margin-top: 0.4cm; }}
.badge-code {{ font-family: monospace; font-size: 12pt; }}
</style>
</head>
<body>
<div class="badge">{body}<div class="badge-qr"><img src="{qr}" alt="QR code"></div>{code}</div>
<script>
window.onload = function () {{
  window.onafterprint = function () {{ window.close(); }};
  window.print();
}};
</script>
</body>
</html>
"#,
            title = escape_html(&self.full_name),
            w = BADGE_WIDTH_CM,
            h = BADGE_HEIGHT_CM,
            body = self.body_html(),
            qr = escape_html(&self.qr_image_url),
            code = self.code_html(),
        )
    }

    pub fn print_file_name(&self) -> String {
        format!("badge-{}.html", file_stem(&self.qr_payload))
    }

    fn body_html(&self) -> String {
        let mut html = String::new();
        if let Some(banner) = &self.banner_url {
            html.push_str(&format!(
                "<div class=\"badge-banner\"><img src=\"{}\" alt=\"\"></div>",
                escape_html(banner)
            ));
        }
        html.push_str(&format!(
            "<div class=\"badge-event\">{}</div><div class=\"badge-name\">{}</div>",
            escape_html(&self.event_name),
            escape_html(&self.full_name)
        ));
        if let Some(company) = &self.company {
            html.push_str(&format!(
                "<div class=\"badge-company\">{}</div>",
                escape_html(company)
            ));
        }
        if let Some(title) = &self.job_title {
            html.push_str(&format!(
                "<div class=\"badge-title\">{}</div>",
                escape_html(title)
            ));
        }
        html.push_str(&format!(
            "<div class=\"badge-type\">{}</div>",
            escape_html(self.participant_type.as_label())
        ));
        html
    }

    fn code_html(&self) -> String {
        format!(
            "<div class=\"badge-code\">{}</div>",
            escape_html(&self.qr_payload)
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn file_stem(payload: &str) -> String {
    payload
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::participant::sample_participant;
    use crate::use_cases::lookup::{LookupOutcome, LookupService};
    use crate::use_cases::retry::RetryPolicy;
    use crate::use_cases::test_support::FakeDirectory;
    use std::sync::Arc;

    fn renderer() -> BadgeRenderer {
        BadgeRenderer::new(
            Url::parse("https://qr.example.com/v1/create-qr-code/").expect("valid url"),
        )
    }

    fn event() -> EventInfo {
        EventInfo {
            id: "evt-1".to_string(),
            name: "RustConf <2026>".to_string(),
            banner_url: Some("https://cdn.example.com/banner.png".to_string()),
        }
    }

    #[tokio::test]
    async fn when_badge_payload_is_scanned_then_it_resolves_the_same_participant() {
        let with_code = sample_participant("3f2a9c1e-77aa-4bcd-9e01-5f5f5f5f5f5f", Some("A1B2C3"));
        let without_code = sample_participant("9b8e7d6c-1111-2222-3333-444455556666", None);
        let directory = Arc::new(FakeDirectory::with(vec![
            with_code.clone(),
            without_code.clone(),
        ]));
        let lookup = LookupService::new(directory, RetryPolicy::default());

        for participant in [with_code, without_code] {
            let badge = renderer().render(&participant, &event());
            let outcome = lookup
                .resolve_by_code(&badge.qr_payload, "evt-1")
                .await
                .expect("lookup should succeed");

            assert!(
                matches!(&outcome, LookupOutcome::Found(found) if found.id == participant.id),
                "payload {} did not resolve back to {}",
                badge.qr_payload,
                participant.id
            );
        }
    }

    #[test]
    fn when_rendered_then_document_carries_participant_fields() {
        let participant = sample_participant("p1-long-identifier", None);

        let badge = renderer().render(&participant, &event());

        assert_eq!(badge.full_name, "Ada Lovelace");
        assert_eq!(badge.company.as_deref(), Some("Analytical Engines"));
        assert_eq!(badge.job_title, None);
        assert_eq!(badge.qr_payload, "p1-long-i");
        assert!(badge.qr_image_url.contains("data=p1-long-i"));
    }

    #[test]
    fn when_print_layout_is_built_then_it_has_fixed_size_and_auto_prints() {
        let participant = sample_participant("p1", Some("A1 B2&C3"));

        let html = renderer().render(&participant, &event()).print_html();

        assert!(html.contains("size: 9.5cm 13cm"));
        assert!(html.contains("window.print()"));
        assert!(html.contains("window.close()"));
        assert!(html.contains("RustConf &lt;2026&gt;"));
        assert!(html.contains("data=A1+B2%26C3"));
        assert!(html.contains("<div class=\"badge-code\">A1 B2&amp;C3</div>"));
    }

    #[test]
    fn when_preview_is_built_then_it_embeds_an_svg_qr_and_the_same_fields() {
        let participant = sample_participant("p1", Some("A1B2C3"));
        let badge = renderer().render(&participant, &event());

        let preview = badge.preview_html().expect("preview renders");

        assert!(preview.contains("<svg"));
        assert!(preview.contains("Ada Lovelace"));
        assert!(preview.contains("<div class=\"badge-code\">A1B2C3</div>"));
    }

    #[test]
    fn when_raster_is_built_then_it_is_a_png_named_after_the_payload() {
        let participant = sample_participant("p1", Some("A1B2C3"));

        let image = renderer()
            .render(&participant, &event())
            .raster()
            .expect("raster renders");

        assert_eq!(image.file_name, "badge-A1B2C3.png");
        assert_eq!(
            renderer().render(&participant, &event()).print_file_name(),
            "badge-A1B2C3.html"
        );
        assert!(image.png.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
