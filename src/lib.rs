//! Pagestitch Full-Page Capture
//!
//! Captures an arbitrarily tall web page as one compliant document: the page
//! is sliced into bounded-height screenshots, stitched into a single surface,
//! given a metadata header band and re-sliced into fixed-aspect document
//! pages.
//!
//! # Pipeline
//!
//! - **Slice capture** ([`capture`]): drives a [`control::PageControl`]
//!   handle to pre-scroll lazy content, measure the page and grab slices
//! - **Stitching** ([`stitch`]): concatenates slices under a surface height cap
//! - **Overlay** ([`overlay`]): prepends the metadata header band
//! - **Pagination** ([`paginate`]): re-slices into PDF pages
//! - **Naming / manifest** ([`naming`], [`manifest`]): filenames, folders and
//!   the per-session audit ledger
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use pagestitch::cdp::{CdpConfig, CdpConnector};
//! use pagestitch::pipeline::{CapturePipeline, CaptureRequest};
//! use pagestitch::sink::DirectorySink;
//! use pagestitch::{CaptureConfig, CaptureMode, SessionConfig};
//!
//! let mut connector = CdpConnector::launch(CdpConfig::default())?;
//! let session = SessionConfig {
//!     mode: CaptureMode::Flow,
//!     date: "2026-02-09".into(),
//!     language: "en".into(),
//!     flow_or_set_name: "Checkout".into(),
//!     login_state: "logged-in".into(),
//!     version: "v3.12.0".into(),
//! };
//! let mut pipeline = CapturePipeline::new(CaptureConfig::default(), session)?;
//! let mut sink = DirectorySink::new("out");
//! let request = CaptureRequest::new(7, "Checkout Page", "2026-02-09 10:00:00");
//! let outcome = pipeline.run(&mut connector, "https://example.com/checkout", &request, &mut sink)?;
//! println!("wrote {}", outcome.pdf_filename);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "cdp"))]
//! # fn main() {}
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod control;
pub mod capture;
pub mod stitch;
pub mod overlay;
pub mod paginate;
pub mod naming;
pub mod manifest;
pub mod sink;
pub mod pipeline;

// CDP backend (feature-gated)
#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly facade (worker-thread backed)
pub mod async_api;

pub use async_api::Capturer;
pub use capture::{CapturedPage, Slice, SliceCapturer};
pub use naming::CaptureMode;
pub use overlay::OverlayMetadata;
pub use stitch::Stitched;

/// Configuration for the capture pipeline
///
/// The defaults target a desktop-width capture with conservative bitmap
/// limits:
/// - slices are at most 4000 CSS px tall (below every known GPU texture cap)
/// - the stitched surface is capped at 16384 px
/// - pages use the A4 long-edge ratio
///
/// # Examples
///
/// ```
/// let cfg = pagestitch::CaptureConfig::default();
/// assert_eq!(cfg.max_surface_height, 16384);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Fixed logical capture width in CSS pixels
    pub capture_width: u32,
    /// Viewport height used while capturing
    pub viewport_height: u32,
    /// Maximum slice height in CSS pixels
    pub chunk_height: u32,
    /// Hard ceiling for the stitched surface, in device pixels
    pub max_surface_height: u32,
    /// Delay after each lazy-load scroll step
    pub scroll_step_delay_ms: u64,
    /// Delay after scrolling to the very bottom
    pub bottom_settle_ms: u64,
    /// Delay after scrolling back to the top
    pub top_settle_ms: u64,
    /// Upper bound on lazy-load scroll steps (infinite-scroll pages)
    pub max_scroll_steps: u32,
    /// Page height divided by page width
    pub page_aspect: f64,
    /// JPEG quality for document pages (1..=100)
    pub jpeg_quality: u8,
    /// Points per device pixel in the paginated document
    pub px_to_pt: f64,
    /// Fill color for the unused band of the last page
    pub background: [u8; 3],
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_width: 1280,
            viewport_height: 900,
            chunk_height: 4000,
            max_surface_height: 16384,
            scroll_step_delay_ms: 150,
            bottom_settle_ms: 1500,
            top_settle_ms: 300,
            max_scroll_steps: 400,
            page_aspect: 297.0 / 210.0,
            jpeg_quality: 92,
            px_to_pt: 0.75,
            background: [255, 255, 255],
        }
    }
}

impl CaptureConfig {
    /// Config with all scroll delays zeroed (tests, pre-rendered pages)
    pub fn without_delays() -> Self {
        Self {
            scroll_step_delay_ms: 0,
            bottom_settle_ms: 0,
            top_settle_ms: 0,
            ..Default::default()
        }
    }

    /// Check the config for values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.capture_width == 0 || self.viewport_height == 0 {
            return Err(Error::Config("capture width and viewport height must be non-zero".into()));
        }
        if self.chunk_height == 0 {
            return Err(Error::Config("chunk_height must be non-zero".into()));
        }
        if self.max_surface_height == 0 {
            return Err(Error::Config("max_surface_height must be non-zero".into()));
        }
        if !(self.page_aspect.is_finite() && self.page_aspect > 0.0) {
            return Err(Error::Config(format!("page_aspect must be positive, got {}", self.page_aspect)));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(Error::Config(format!("jpeg_quality must be in 1..=100, got {}", self.jpeg_quality)));
        }
        if !(self.px_to_pt.is_finite() && self.px_to_pt > 0.0) {
            return Err(Error::Config(format!("px_to_pt must be positive, got {}", self.px_to_pt)));
        }
        Ok(())
    }
}

/// Per-session values supplied by the session/config source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: CaptureMode,
    /// Capture date, `YYYY-MM-DD`
    pub date: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub flow_or_set_name: String,
    pub login_state: String,
    pub version: String,
}

fn default_language() -> String {
    naming::LANGUAGE_TAG.to_string()
}
