//! PDF inputs: embedded text via pdf-extract, first page image via lopdf.
//!
//! Scanned PDFs carry no text layer; their page image is handed to the image
//! backend's OCR instead.

use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Document, Object};
use tracing::{debug, trace, warn};

use super::{BackendOutput, ImageBackend, TextBackend};
use crate::error::PdfError;

/// Backend for PDF documents (DANFE prints, scanned receipts).
#[derive(Debug, Clone, Default)]
pub struct PdfBackend {
    scans: ImageBackend,
}

impl PdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// OCR text-less PDFs through `scans`.
    pub fn with_scan_backend(mut self, scans: ImageBackend) -> Self {
        self.scans = scans;
        self
    }

    /// Load the document, decrypting empty-password files.
    ///
    /// Returns the document and the bytes pdf-extract should read.
    fn load(data: &[u8]) -> Result<(Document, Vec<u8>), PdfError> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        if doc.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }
        Ok((doc, raw))
    }

    fn read(&self, path: &Path) -> Result<BackendOutput, PdfError> {
        let data = std::fs::read(path).map_err(|e| PdfError::Parse(e.to_string()))?;
        let (doc, raw) = Self::load(&data)?;

        let image = first_image(&doc).and_then(|img| {
            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .ok()
                .map(|_| png)
        });

        let text = match pdf_extract::extract_text_from_mem(&raw) {
            Ok(text) => text,
            Err(e) if image.is_some() => {
                warn!("No text layer in {}: {}", path.display(), e);
                String::new()
            }
            Err(e) => return Err(PdfError::TextExtraction(e.to_string())),
        };

        let text = match (text.trim().is_empty(), &image) {
            (true, Some(png)) => {
                debug!("PDF has no embedded text, running OCR on the page image");
                self.scans.recognize_png(png).unwrap_or_default()
            }
            _ => text.trim().to_string(),
        };

        debug!(
            "PDF with {} pages: {} chars of text, image: {}",
            doc.get_pages().len(),
            text.len(),
            image.is_some()
        );
        Ok(BackendOutput::ok(text, image))
    }
}

impl TextBackend for PdfBackend {
    fn extract(&self, path: &Path) -> BackendOutput {
        match self.read(path) {
            Ok(output) => output,
            Err(e) => BackendOutput::failed(e.to_string()),
        }
    }
}

/// First decodable image XObject in the document.
fn first_image(doc: &Document) -> Option<DynamicImage> {
    doc.objects.values().find_map(|obj| decode_image(doc, obj))
}

fn decode_image(doc: &Document, obj: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = obj else {
        return None;
    };
    let dict = &stream.dict;
    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!("Found image object: {}x{}", width, height);

    let filter = dict.get(b"Filter").ok().and_then(|f| match f {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
        _ => None,
    });
    match filter {
        Some(b"DCTDecode") => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            trace!("Skipping image with unsupported filter");
            return None;
        }
        _ => {}
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        return None;
    }

    raw_to_rgba(&data, width, height, color_space)
}

fn raw_to_rgba(data: &[u8], width: u32, height: u32, color_space: &[u8]) -> Option<DynamicImage> {
    let pixels = (width as usize) * (height as usize);
    let rgba: Vec<u8> = match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= pixels * 3 => data[..pixels * 3]
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            data[..pixels].iter().flat_map(|&g| [g, g, g, 255]).collect()
        }
        _ => return None,
    };
    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba).map(DynamicImage::ImageRgba8)
}
