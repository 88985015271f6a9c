//! QR code support for identity keys

use crate::error::{WalletError, WalletResult};
use crate::keys::IdentityKey;
use image::{DynamicImage, Luma};
use qrcode::QrCode;

/// QR code utilities for the identity key text representation
pub struct QrCodeHandler;

impl QrCodeHandler {
    /// Encode an identity key to a QR code
    ///
    /// The payload is the canonical compressed-hex encoding. Returns PNG
    /// image data as bytes.
    pub fn encode(key: &IdentityKey) -> WalletResult<Vec<u8>> {
        let qr = QrCode::new(key.to_hex().as_bytes())
            .map_err(|e| WalletError::QrCodeError(format!("Failed to generate QR code: {}", e)))?;

        let image = qr.render::<Luma<u8>>().build();

        let mut png_data = Vec::new();
        let dynamic_image = DynamicImage::ImageLuma8(image);
        dynamic_image
            .write_to(&mut std::io::Cursor::new(&mut png_data), image::ImageFormat::Png)
            .map_err(|e| WalletError::QrCodeError(format!("Failed to encode PNG: {}", e)))?;

        Ok(png_data)
    }

    /// Decode a scanned QR code into an identity key
    ///
    /// Accepts PNG image data as bytes. The decoded payload is validated as
    /// a compressed point before it is usable as a counterparty; anything
    /// else is `InvalidCounterparty`.
    pub fn decode(qr_data: &[u8]) -> WalletResult<IdentityKey> {
        let img = image::load_from_memory(qr_data)
            .map_err(|e| WalletError::QrCodeError(format!("Failed to load image: {}", e)))?;

        let gray_img = img.to_luma8();

        let mut prepared = rqrr::PreparedImage::prepare(gray_img);
        let grids = prepared.detect_grids();

        if grids.is_empty() {
            return Err(WalletError::QrCodeError("No QR code found in image".to_string()));
        }

        let (_, content) = grids[0]
            .decode()
            .map_err(|e| WalletError::QrCodeError(format!("Failed to decode QR code: {:?}", e)))?;

        IdentityKey::parse(&content)
    }
}
