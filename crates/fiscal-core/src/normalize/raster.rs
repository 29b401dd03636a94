//! Image inputs: decode, re-encode as PNG, optionally OCR.

use std::io::{Cursor, Write};
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

use super::{BackendOutput, TextBackend};
use crate::models::config::OcrConfig;

/// External OCR executable invoked as `<program> <image> stdout -l <language>`.
#[derive(Debug, Clone)]
pub struct OcrCommand {
    pub program: String,
    pub language: String,
}

impl OcrCommand {
    fn run(&self, path: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .arg(path)
            .arg("stdout")
            .args(["-l", &self.language])
            .output();

        match output {
            Ok(out) if out.status.success() => Some(String::from_utf8_lossy(&out.stdout).into_owned()),
            Ok(out) => {
                warn!(
                    "OCR command {} exited with {}: {}",
                    self.program,
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("OCR command {} could not be started: {}", self.program, e);
                None
            }
        }
    }
}

/// Backend for scans and photos.
#[derive(Debug, Clone, Default)]
pub struct ImageBackend {
    ocr: Option<OcrCommand>,
}

impl ImageBackend {
    /// Backend without OCR; the oracle reads the image directly.
    pub fn new() -> Self {
        Self { ocr: None }
    }

    pub fn with_ocr(mut self, command: OcrCommand) -> Self {
        self.ocr = Some(command);
        self
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// OCR an in-memory PNG, e.g. a page image pulled out of a scanned PDF.
    ///
    /// `None` when no OCR command is configured or the command fails.
    pub fn recognize_png(&self, png: &[u8]) -> Option<String> {
        let ocr = self.ocr.as_ref()?;
        let mut file = match tempfile::Builder::new().suffix(".png").tempfile() {
            Ok(file) => file,
            Err(e) => {
                warn!("Cannot stage page image for OCR: {}", e);
                return None;
            }
        };
        if let Err(e) = file.write_all(png).and_then(|_| file.flush()) {
            warn!("Cannot stage page image for OCR: {}", e);
            return None;
        }
        ocr.run(file.path()).map(|text| text.trim().to_string())
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        let backend = Self::new();
        if config.enabled {
            backend.with_ocr(OcrCommand {
                program: config.command.clone(),
                language: config.language.clone(),
            })
        } else {
            backend
        }
    }
}

impl TextBackend for ImageBackend {
    fn extract(&self, path: &Path) -> BackendOutput {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => return BackendOutput::failed(format!("cannot read {}: {}", path.display(), e)),
        };
        let img = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => return BackendOutput::failed(format!("cannot decode image: {}", e)),
        };
        debug!("Decoded image {}x{}", img.width(), img.height());

        let mut png = Vec::new();
        if let Err(e) = img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png) {
            return BackendOutput::failed(format!("cannot encode image: {}", e));
        }

        let text = self
            .ocr
            .as_ref()
            .and_then(|ocr| ocr.run(path))
            .unwrap_or_default();

        BackendOutput::ok(text.trim(), Some(png))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn write_png(path: &Path) {
        let img = ImageBuffer::from_pixel(4, 3, Rgba([255u8, 255, 255, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_image_is_reencoded_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bmp");
        let img = ImageBuffer::from_pixel(2, 2, Rgb([0u8, 0, 0]));
        img.save(&path).unwrap();

        let out = ImageBackend::new().extract(&path);
        assert!(out.success);
        assert_eq!(out.text, "");
        let png = out.image.unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_missing_ocr_command_degrades_to_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        write_png(&path);

        let backend = ImageBackend::new().with_ocr(OcrCommand {
            program: "definitely-not-an-ocr-binary".to_string(),
            language: "por".to_string(),
        });
        let out = backend.extract(&path);
        assert!(out.success);
        assert!(out.text.is_empty());
        assert!(out.image.is_some());
    }

    #[test]
    fn test_recognize_png_without_ocr() {
        assert!(!ImageBackend::new().has_ocr());
        assert_eq!(ImageBackend::new().recognize_png(b"\x89PNG"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_recognize_png_runs_command_on_staged_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ocr");
        std::fs::write(&script, "#!/bin/sh\ncase \"$1\" in *.png) test -s \"$1\" && echo \"  CUPOM FISCAL  \";; esac\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = ImageBackend::new().with_ocr(OcrCommand {
            program: script.display().to_string(),
            language: "por".to_string(),
        });
        assert_eq!(backend.recognize_png(b"\x89PNG data").as_deref(), Some("CUPOM FISCAL"));
    }

    #[test]
    fn test_undecodable_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"garbage").unwrap();
        let out = ImageBackend::new().extract(&path);
        assert!(!out.success);
        assert!(out.error.unwrap().contains("decode"));
    }
}
