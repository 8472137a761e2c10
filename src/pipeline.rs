//! End-to-end capture: slice → stitch → overlay → PNG + PDF → manifest row
//!
//! Stages run strictly in order and each either completes or reports one
//! error kind. Artifacts reach the sink only after the stage producing them
//! succeeded.

use crate::capture::{CapturedPage, Slice, SliceCapturer};
use crate::control::{Connector, Session};
use crate::manifest::{Manifest, ManifestRow};
use crate::naming;
use crate::overlay::{apply_overlay, OverlayMetadata};
use crate::paginate::Paginator;
use crate::sink::PersistenceSink;
use crate::stitch::stitch_page;
use crate::{CaptureConfig, Error, Result, SessionConfig};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use log::{info, warn};
use sha2::{Digest, Sha256};
use url::Url;

/// Per-capture values supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Step number (flow mode) or page index (set mode)
    pub index: u32,
    pub page_name: String,
    /// Caller-supplied timestamp string shown in the header and ledger
    pub timestamp: String,
    pub description: String,
}

impl CaptureRequest {
    pub fn new(index: u32, page_name: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            index,
            page_name: page_name.into(),
            timestamp: timestamp.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Overlaid surface plus residual slices, ready for encoding.
///
/// Keeping this around lets document generation be retried without
/// re-capturing the page.
#[derive(Debug, Clone)]
pub struct Composed {
    pub surface: RgbaImage,
    pub residual: Vec<Slice>,
    pub pixel_ratio: f64,
    pub url: String,
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub folder: String,
    pub png_filename: String,
    pub pdf_filename: String,
    pub manifest_filename: String,
    /// Hex SHA-256 of the PNG artifact
    pub png_sha256: String,
    pub duplicate: bool,
    pub row: ManifestRow,
}

/// Runs captures for one session and keeps its ledger
pub struct CapturePipeline {
    config: CaptureConfig,
    session: SessionConfig,
    manifest: Manifest,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig, session: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session,
            manifest: Manifest::new(),
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Load the session's existing ledger from `sink`, if there is one
    pub fn load_manifest<S: PersistenceSink>(&mut self, sink: &S) -> Result<()> {
        let folder = naming::session_folder(&self.session.date, &self.session.version);
        let name = naming::manifest_filename(&self.session.date, &self.session.version);
        if let Some(bytes) = sink.read_file(&folder, &name)? {
            let text = String::from_utf8(bytes)
                .map_err(|e| Error::Persistence(format!("{} is not UTF-8: {}", name, e)))?;
            self.manifest = Manifest::parse(&text)?;
            info!("loaded {} manifest rows from {}", self.manifest.len(), name);
        }
        Ok(())
    }

    /// Artifact folder for this session
    pub fn folder(&self) -> String {
        naming::folder_path(
            &self.session.date,
            &self.session.version,
            self.session.mode,
            &self.session.flow_or_set_name,
        )
    }

    /// Artifact filename for `request` with `extension`
    pub fn filename(&self, request: &CaptureRequest, extension: &str) -> String {
        naming::generate_filename(
            self.session.mode,
            request.index,
            &request.page_name,
            &self.session.login_state,
            &self.session.version,
            &self.session.date,
            extension,
        )
    }

    /// Attach to `target`, capture every slice, and detach.
    pub fn capture_page<C: Connector>(&self, connector: &mut C, target: &str) -> Result<CapturedPage> {
        let mut session = Session::attach(connector, target)?;
        let captured = SliceCapturer::new(self.config.clone()).capture(&mut *session);
        let released = session.release();

        match (captured, released) {
            (Ok(page), Ok(())) => Ok(page),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), released) => {
                if let Err(detach_err) = released {
                    warn!("Failed to detach from {} after capture error: {}", target, detach_err);
                }
                Err(e)
            }
        }
    }

    /// Header values for `request` captured from `url`
    pub fn metadata(&self, request: &CaptureRequest, url: &str, pixel_ratio: f64) -> OverlayMetadata {
        OverlayMetadata {
            mode_label: Some(self.session.mode.label().to_string()),
            flow_or_set_name: Some(self.session.flow_or_set_name.clone()),
            step_or_index: Some(format!("{:02}", request.index)),
            page_name: Some(request.page_name.clone()),
            login_state: Some(self.session.login_state.clone()),
            version: Some(self.session.version.clone()),
            timestamp: Some(request.timestamp.clone()),
            url_path: Some(url_parts(url).1),
            pixel_scale_ratio: pixel_ratio,
        }
    }

    /// Stitch the captured slices and prepend the header band
    pub fn compose(&self, captured: CapturedPage, request: &CaptureRequest, url: &str) -> Result<Composed> {
        let stitched = stitch_page(captured, self.config.max_surface_height)?;
        let metadata = self.metadata(request, url, stitched.pixel_ratio);
        let surface = apply_overlay(&stitched.surface, &metadata)?;
        info!("composed {}x{} surface for {}", surface.width(), surface.height(), url);
        Ok(Composed {
            surface,
            residual: stitched.residual,
            pixel_ratio: stitched.pixel_ratio,
            url: url.to_string(),
        })
    }

    /// Paginated document for a composed capture
    pub fn render_document(&self, composed: &Composed) -> Result<Vec<u8>> {
        Paginator::from_config(&self.config).render_pdf(&composed.surface, &composed.residual)
    }

    /// Capture `target` and persist both artifacts plus the ledger row
    pub fn run<C, S>(
        &mut self,
        connector: &mut C,
        target: &str,
        request: &CaptureRequest,
        sink: &mut S,
    ) -> Result<CaptureOutcome>
    where
        C: Connector,
        S: PersistenceSink,
    {
        let captured = self.capture_page(connector, target)?;
        let composed = self.compose(captured, request, target)?;
        self.persist(&composed, request, sink)
    }

    /// Encode and write the PNG, then the PDF, then append and write the
    /// manifest row. A document encoding or ledger write failure leaves the
    /// in-memory ledger untouched; call again with the same `composed` to retry.
    pub fn persist<S: PersistenceSink>(
        &mut self,
        composed: &Composed,
        request: &CaptureRequest,
        sink: &mut S,
    ) -> Result<CaptureOutcome> {
        let folder = self.folder();
        let png_filename = self.filename(request, "png");
        let pdf_filename = self.filename(request, "pdf");

        let png = encode_png(&composed.surface)?;
        let png_sha256 = hex::encode(Sha256::digest(&png));
        sink.write_file(&folder, &png_filename, &png)?;
        info!("saved {}{} (sha256 {})", folder, png_filename, png_sha256);

        let pdf = self.render_document(composed)?;
        sink.write_file(&folder, &pdf_filename, &pdf)?;
        info!("saved {}{}", folder, pdf_filename);

        let duplicate = self.manifest.contains_url(&composed.url);
        if duplicate {
            warn!("{} was already captured in this session", composed.url);
        }
        let row = self.manifest_row(request, &composed.url, &png_filename, &pdf_filename, duplicate);
        let mut next = self.manifest.clone();
        next.append(row.clone());
        let manifest_filename = self.write_manifest(&next, sink)?;
        self.manifest = next;

        Ok(CaptureOutcome {
            folder,
            png_filename,
            pdf_filename,
            manifest_filename,
            png_sha256,
            duplicate,
            row,
        })
    }

    /// Replace the most recent ledger row that produced `prior_filename`
    /// and rewrite the ledger
    pub fn edit_last<S: PersistenceSink>(&mut self, prior_filename: &str, row: ManifestRow, sink: &mut S) -> Result<()> {
        let mut next = self.manifest.clone();
        next.edit_last(prior_filename, row)?;
        self.write_manifest(&next, sink)?;
        self.manifest = next;
        Ok(())
    }

    /// Ledger row for a capture
    pub fn manifest_row(
        &self,
        request: &CaptureRequest,
        url: &str,
        png_filename: &str,
        pdf_filename: &str,
        duplicate: bool,
    ) -> ManifestRow {
        let (hostname, url_path) = url_parts(url);
        ManifestRow {
            timestamp: request.timestamp.clone(),
            version: self.session.version.clone(),
            mode: self.session.mode.label().to_string(),
            flow_or_set_name: self.session.flow_or_set_name.clone(),
            step_or_index: format!("{:02}", request.index),
            page_name: request.page_name.clone(),
            login_state: self.session.login_state.clone(),
            language: self.session.language.clone(),
            hostname,
            url: url.to_string(),
            url_path,
            png_filename: png_filename.to_string(),
            pdf_filename: pdf_filename.to_string(),
            description: request.description.clone(),
            duplicate,
        }
    }

    /// Write `ledger` to the session manifest file. The in-memory ledger is
    /// only replaced by callers once this succeeds.
    fn write_manifest<S: PersistenceSink>(&self, ledger: &Manifest, sink: &mut S) -> Result<String> {
        let folder = naming::session_folder(&self.session.date, &self.session.version);
        let name = naming::manifest_filename(&self.session.date, &self.session.version);
        sink.write_file(&folder, &name, ledger.to_csv().as_bytes())?;
        Ok(name)
    }
}

/// `(hostname, path)` of `url`; both empty when it does not parse
fn url_parts(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or_default().to_string(),
            parsed.path().to_string(),
        ),
        Err(_) => (String::new(), String::new()),
    }
}

/// Lossless PNG of the overlaid surface
pub fn encode_png(surface: &RgbaImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(surface.as_raw(), surface.width(), surface.height(), ColorType::Rgba8.into())
        .map_err(|e| Error::Encoding(format!("PNG: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureMode;

    fn session() -> SessionConfig {
        SessionConfig {
            mode: CaptureMode::Set,
            date: "2026-02-09".into(),
            language: "en".into(),
            flow_or_set_name: "spring promo".into(),
            login_state: "logged-out".into(),
            version: "v3.12.0".into(),
        }
    }

    #[test]
    fn names_follow_session() {
        let pipeline = CapturePipeline::new(CaptureConfig::default(), session()).unwrap();
        let request = CaptureRequest::new(4, "Home Page", "2026-02-09 10:00:00");
        assert_eq!(pipeline.folder(), "Exemplars/2026-02-09_v3.12.0/Set_SpringPromo/");
        assert_eq!(pipeline.filename(&request, "pdf"), "LP04_HomePage_LoggedOut_en_v3.12.0_2026-02-09.pdf");
    }

    #[test]
    fn manifest_row_splits_url() {
        let pipeline = CapturePipeline::new(CaptureConfig::default(), session()).unwrap();
        let request = CaptureRequest::new(1, "Home", "t").with_description("Refund, 30 days");
        let row = pipeline.manifest_row(&request, "https://shop.example.com/promo/spring?x=1", "a.png", "a.pdf", false);
        assert_eq!(row.hostname, "shop.example.com");
        assert_eq!(row.url_path, "/promo/spring");
        assert_eq!(row.mode, "Set");
        assert_eq!(row.step_or_index, "01");
        assert_eq!(row.description, "Refund, 30 days");
    }

    #[test]
    fn metadata_carries_pixel_ratio() {
        let pipeline = CapturePipeline::new(CaptureConfig::default(), session()).unwrap();
        let meta = pipeline.metadata(&CaptureRequest::new(2, "p", "t"), "not a url", 2.0);
        assert_eq!(meta.pixel_scale_ratio, 2.0);
        assert_eq!(meta.url_path.as_deref(), Some(""));
        assert_eq!(meta.mode_label.as_deref(), Some("Set"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = CaptureConfig { chunk_height: 0, ..Default::default() };
        assert!(matches!(CapturePipeline::new(config, session()), Err(Error::Config(_))));
    }
}
