//! Pass numbers and the QR payload printed on a digital pass.

use std::io::Cursor;

use chrono::NaiveDate;
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use thiserror::Error;

use crate::media::MediaError;

/// Smallest edge of the rendered QR image, in pixels.
const QR_MIN_DIMENSION: u32 = 256;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("QR encoding failed: {0}")]
    Encode(String),

    #[error("QR rendering failed: {0}")]
    Render(String),

    #[error("QR artifact could not be stored: {0}")]
    Storage(#[from] MediaError),
}

/// Everything needed to issue the pass for one approved application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassCard {
    pub pass_number: String,
    pub payload: String,
}

impl PassCard {
    pub fn issue(
        application_id: i64,
        approved_on: NaiveDate,
        holder_name: &str,
        start_point: &str,
        end_point: &str,
    ) -> Self {
        Self::with_number(
            pass_number(application_id, approved_on),
            holder_name,
            start_point,
            end_point,
        )
    }

    /// Card for a pass number that was already issued.
    pub fn with_number(
        pass_number: String,
        holder_name: &str,
        start_point: &str,
        end_point: &str,
    ) -> Self {
        let payload = format!(
            "PASS_NO:{pass_number}|USER:{holder_name}|ROUTE:{start_point}-{end_point}|STATUS:APPROVED"
        );
        Self {
            pass_number,
            payload,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.png", self.pass_number)
    }

    /// Renders the payload off the async runtime.
    pub async fn render(&self) -> Result<Vec<u8>, GenerationError> {
        let payload = self.payload.clone();
        tokio::task::spawn_blocking(move || render_png(&payload))
            .await
            .map_err(|e| GenerationError::Render(e.to_string()))?
    }
}

pub fn pass_number(application_id: i64, approved_on: NaiveDate) -> String {
    format!("BP-{}-{}", application_id, approved_on.format("%Y%m%d"))
}

/// Encodes `payload` as a grayscale QR code PNG.
pub fn render_png(payload: &str) -> Result<Vec<u8>, GenerationError> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| GenerationError::Encode(e.to_string()))?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .build();

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| GenerationError::Render(e.to_string()))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_pass_number_embeds_id_and_compact_date() {
        assert_eq!(pass_number(42, date(2025, 3, 7)), "BP-42-20250307");
    }

    #[test]
    fn test_payload_has_fixed_layout() {
        let card = PassCard::issue(5, date(2025, 12, 31), "Alice", "Majestic", "Whitefield");

        assert_eq!(card.pass_number, "BP-5-20251231");
        assert_eq!(
            card.payload,
            "PASS_NO:BP-5-20251231|USER:Alice|ROUTE:Majestic-Whitefield|STATUS:APPROVED"
        );
        assert_eq!(card.file_name(), "BP-5-20251231.png");
    }

    #[test]
    fn test_issue_is_deterministic() {
        let a = PassCard::issue(9, date(2025, 1, 2), "Ravi", "Jayanagar", "Indiranagar");
        let b = PassCard::issue(9, date(2025, 1, 2), "Ravi", "Jayanagar", "Indiranagar");
        assert_eq!(a, b);

        let reissued =
            PassCard::with_number("BP-9-20250102".to_string(), "Ravi", "Jayanagar", "Indiranagar");
        assert_eq!(reissued, a);
    }

    #[test]
    fn test_render_produces_png() {
        let png = render_png("PASS_NO:BP-1-20250101|USER:A|ROUTE:X-Y|STATUS:APPROVED")
            .expect("renders");
        assert!(png.len() > PNG_SIGNATURE.len());
        assert_eq!(&png[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_oversized_payload_fails_to_encode() {
        let payload = "x".repeat(8000);
        assert!(matches!(render_png(&payload), Err(GenerationError::Encode(_))));
    }
}
