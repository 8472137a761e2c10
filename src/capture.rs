//! Slice capture: lazy-load pre-scroll, dual measurement and bounded-height
//! slice grabbing over a [`PageControl`] handle.

use crate::control::{Clip, DeviceMetrics, PageControl};
use crate::{CaptureConfig, Error, Result};
use image::RgbaImage;
use log::{debug, info, warn};
use serde_json::Value;
use std::time::Duration;

/// Script expressions sent to the page. Each evaluates to a JSON value.
pub mod scripts {
    /// Current scroll offsets as `{x, y}`
    pub const SCROLL_POSITION: &str = "({x: window.scrollX, y: window.scrollY})";

    /// Scrollable height as the page reports it right now
    pub const SCROLL_HEIGHT: &str =
        "Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight)";

    /// Height from DOM geometry, independent of layout metrics
    pub const DOM_HEIGHT: &str = "Math.max(\
        document.body ? document.body.scrollHeight : 0, \
        document.body ? document.body.offsetHeight : 0, \
        document.documentElement.clientHeight, \
        document.documentElement.scrollHeight, \
        document.documentElement.offsetHeight, \
        Math.ceil(document.documentElement.getBoundingClientRect().height))";

    /// Prefix shared by every scroll command
    pub const SCROLL_TO_PREFIX: &str = "window.scrollTo(";

    /// Scroll vertically to `y`, keeping x at 0
    pub fn scroll_to(y: u32) -> String {
        format!("{}0, {}), window.scrollY", SCROLL_TO_PREFIX, y)
    }

    /// Scroll to an exact position
    pub fn scroll_to_xy(x: f64, y: f64) -> String {
        format!("{}{}, {}), window.scrollY", SCROLL_TO_PREFIX, x, y)
    }
}

/// One bounded-height captured image
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    /// Decoded pixels at device resolution
    pub image: RgbaImage,
    /// Top edge of the slice in CSS pixels
    pub vertical_offset: u32,
}

impl Slice {
    pub fn new(image: RgbaImage, vertical_offset: u32) -> Self {
        Self { image, vertical_offset }
    }

    /// Width in device pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in device pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Result of a full-page capture
#[derive(Debug, Clone)]
pub struct CapturedPage {
    /// Slices in strictly increasing `vertical_offset` order
    pub slices: Vec<Slice>,
    /// Logical capture width in CSS pixels
    pub width: u32,
    /// Measured page height in CSS pixels
    pub height: u32,
    /// Device pixels per CSS pixel, taken from the first slice
    pub pixel_ratio: f64,
}

#[derive(Debug, Clone, Copy)]
struct ScrollPosition {
    x: f64,
    y: f64,
}

/// Captures a page as an ordered sequence of slices
pub struct SliceCapturer {
    config: CaptureConfig,
}

impl SliceCapturer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture the whole page.
    ///
    /// The viewport override and scroll position are restored before
    /// returning, on success and on error.
    pub fn capture<P: PageControl>(&self, page: &mut P) -> Result<CapturedPage> {
        page.enable_domains()?;
        let saved = read_scroll_position(page)?;

        let result = self.capture_inner(page);
        let restored = restore(page, saved);

        match (result, restored) {
            (Ok(captured), Ok(())) => Ok(captured),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                warn!("Failed to restore viewport after capture error: {}", restore_err);
                Err(e)
            }
        }
    }

    fn capture_inner<P: PageControl>(&self, page: &mut P) -> Result<CapturedPage> {
        page.set_device_metrics(&DeviceMetrics {
            width: self.config.capture_width,
            height: self.config.viewport_height,
            device_scale_factor: 0.0,
            mobile: false,
        })?;

        let steps = self.preload_lazy_content(page)?;
        let height = measure_height(page)?;
        debug!("measured page height {}px after {} scroll steps", height, steps);

        let slices = self.capture_slices(page, height)?;
        let pixel_ratio = slices
            .first()
            .map(|s| f64::from(s.width()) / f64::from(self.config.capture_width))
            .unwrap_or(1.0);

        info!(
            "captured {} slices covering {}x{} (ratio {:.2})",
            slices.len(),
            self.config.capture_width,
            height,
            pixel_ratio
        );

        Ok(CapturedPage {
            slices,
            width: self.config.capture_width,
            height,
            pixel_ratio,
        })
    }

    /// Scroll top to bottom in half-viewport steps so lazy content loads.
    /// The scrollable height is re-read after every step.
    fn preload_lazy_content<P: PageControl>(&self, page: &mut P) -> Result<u32> {
        let step = (self.config.viewport_height / 2).max(1);
        let mut y = 0u32;
        let mut steps = 0u32;

        loop {
            let height = as_u32(&page.evaluate(scripts::SCROLL_HEIGHT)?);
            if y >= height {
                break;
            }
            if steps >= self.config.max_scroll_steps {
                warn!("Stopping lazy-load scroll after {} steps at y={} (height {})", steps, y, height);
                break;
            }
            page.evaluate(&scripts::scroll_to(y))?;
            pause(self.config.scroll_step_delay_ms);
            y = y.saturating_add(step);
            steps += 1;
        }

        let bottom = as_u32(&page.evaluate(scripts::SCROLL_HEIGHT)?);
        page.evaluate(&scripts::scroll_to(bottom))?;
        pause(self.config.bottom_settle_ms);

        page.evaluate(&scripts::scroll_to(0))?;
        pause(self.config.top_settle_ms);

        Ok(steps)
    }

    fn capture_slices<P: PageControl>(&self, page: &mut P, height: u32) -> Result<Vec<Slice>> {
        let width = f64::from(self.config.capture_width);
        let mut slices = Vec::new();

        for y in (0..height).step_by(self.config.chunk_height as usize) {
            let chunk = self.config.chunk_height.min(height - y);
            let clip = Clip {
                x: 0.0,
                y: f64::from(y),
                width,
                height: f64::from(chunk),
            };
            let bytes = page
                .capture_clip(&clip)
                .map_err(|e| Error::Capture(format!("slice at y={}: {}", y, e)))?;
            let image = image::load_from_memory(&bytes)
                .map_err(|e| Error::Capture(format!("slice at y={} is not a decodable image: {}", y, e)))?
                .to_rgba8();
            debug!("slice y={} -> {}x{}px", y, image.width(), image.height());
            slices.push(Slice::new(image, y));
        }

        Ok(slices)
    }
}

/// Page height as the larger of the layout-metrics and DOM-geometry readings
fn measure_height<P: PageControl>(page: &mut P) -> Result<u32> {
    let metrics = page.layout_metrics()?;
    let dom = as_f64(&page.evaluate(scripts::DOM_HEIGHT)?);
    let height = metrics.content_height.max(dom);
    if !(height.is_finite() && height >= 1.0) {
        return Err(Error::Measurement(format!(
            "layout metrics reported {} and DOM geometry {}",
            metrics.content_height, dom
        )));
    }
    Ok(height.ceil() as u32)
}

fn read_scroll_position<P: PageControl>(page: &mut P) -> Result<ScrollPosition> {
    let value = page.evaluate(scripts::SCROLL_POSITION)?;
    Ok(ScrollPosition {
        x: value.get("x").map(as_f64).unwrap_or(0.0),
        y: value.get("y").map(as_f64).unwrap_or(0.0),
    })
}

fn restore<P: PageControl>(page: &mut P, saved: ScrollPosition) -> Result<()> {
    let cleared = page.clear_device_metrics();
    let scrolled = page.evaluate(&scripts::scroll_to_xy(saved.x, saved.y)).map(|_| ());
    cleared.and(scrolled)
}

fn pause(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn as_u32(value: &Value) -> u32 {
    let v = as_f64(value);
    if v.is_finite() && v > 0.0 {
        v.ceil().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::LayoutMetrics;
    use image::{ImageFormat, Rgba};
    use serde_json::json;
    use std::io::Cursor;

    /// A page whose height grows once the lazy-load scroll passes 1000px
    struct FakePage {
        height: u32,
        grown_height: u32,
        dom_height: f64,
        layout_height: f64,
        scale: u32,
        fail_clip_at: Option<u32>,
        scroll_y: f64,
        overridden: bool,
        clips: Vec<Clip>,
    }

    impl FakePage {
        fn new(height: u32) -> Self {
            Self {
                height,
                grown_height: height,
                dom_height: f64::from(height),
                layout_height: f64::from(height),
                scale: 1,
                fail_clip_at: None,
                scroll_y: 0.0,
                overridden: false,
                clips: Vec::new(),
            }
        }
    }

    impl PageControl for FakePage {
        fn enable_domains(&mut self) -> Result<()> {
            Ok(())
        }

        fn evaluate(&mut self, expression: &str) -> Result<Value> {
            if expression == scripts::SCROLL_POSITION {
                return Ok(json!({"x": 0, "y": self.scroll_y}));
            }
            if expression == scripts::SCROLL_HEIGHT {
                return Ok(json!(self.height));
            }
            if expression == scripts::DOM_HEIGHT {
                return Ok(json!(self.dom_height));
            }
            if let Some(rest) = expression.strip_prefix(scripts::SCROLL_TO_PREFIX) {
                let y: f64 = rest
                    .split(',')
                    .nth(1)
                    .and_then(|s| s.trim().trim_end_matches(')').parse().ok())
                    .unwrap_or(0.0);
                self.scroll_y = y;
                if y >= 1000.0 {
                    self.height = self.grown_height;
                    self.layout_height = self.layout_height.max(f64::from(self.grown_height));
                }
                return Ok(json!(y));
            }
            Ok(Value::Null)
        }

        fn layout_metrics(&mut self) -> Result<LayoutMetrics> {
            Ok(LayoutMetrics { content_height: self.layout_height, ..Default::default() })
        }

        fn set_device_metrics(&mut self, _metrics: &DeviceMetrics) -> Result<()> {
            self.overridden = true;
            Ok(())
        }

        fn clear_device_metrics(&mut self) -> Result<()> {
            self.overridden = false;
            Ok(())
        }

        fn capture_clip(&mut self, clip: &Clip) -> Result<Vec<u8>> {
            if self.fail_clip_at == Some(clip.y as u32) {
                return Err(Error::Connection("target closed".into()));
            }
            self.clips.push(*clip);
            let img = RgbaImage::from_pixel(
                clip.width as u32 * self.scale,
                clip.height as u32 * self.scale,
                Rgba([10, 20, 30, 255]),
            );
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, ImageFormat::Png).unwrap();
            Ok(out.into_inner())
        }

        fn detach(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn small_config() -> CaptureConfig {
        CaptureConfig {
            capture_width: 40,
            viewport_height: 200,
            chunk_height: 400,
            ..CaptureConfig::without_delays()
        }
    }

    #[test]
    fn slices_cover_page_in_bounded_chunks() {
        let mut page = FakePage::new(900);
        let captured = SliceCapturer::new(small_config()).capture(&mut page).unwrap();
        assert_eq!(captured.height, 900);
        let offsets: Vec<u32> = captured.slices.iter().map(|s| s.vertical_offset).collect();
        assert_eq!(offsets, vec![0, 400, 800]);
        let heights: Vec<u32> = captured.slices.iter().map(|s| s.height()).collect();
        assert_eq!(heights, vec![400, 400, 100]);
        assert_eq!(captured.pixel_ratio, 1.0);
        assert!(!page.overridden);
    }

    #[test]
    fn height_growth_during_scroll_is_picked_up() {
        let mut page = FakePage::new(1200);
        page.grown_height = 2600;
        let captured = SliceCapturer::new(small_config()).capture(&mut page).unwrap();
        assert_eq!(captured.height, 2600);
        assert_eq!(captured.slices.len(), 7);
    }

    #[test]
    fn larger_of_two_measurements_wins() {
        let mut page = FakePage::new(500);
        page.dom_height = 730.0;
        let captured = SliceCapturer::new(small_config()).capture(&mut page).unwrap();
        assert_eq!(captured.height, 730);
    }

    #[test]
    fn pixel_ratio_comes_from_first_slice() {
        let mut page = FakePage::new(300);
        page.scale = 2;
        let captured = SliceCapturer::new(small_config()).capture(&mut page).unwrap();
        assert_eq!(captured.pixel_ratio, 2.0);
        assert_eq!(captured.slices[0].height(), 600);
    }

    #[test]
    fn zero_height_is_measurement_error() {
        let mut page = FakePage::new(0);
        page.dom_height = 0.0;
        let res = SliceCapturer::new(small_config()).capture(&mut page);
        assert!(matches!(res, Err(Error::Measurement(_))));
        assert!(page.clips.is_empty());
        assert!(!page.overridden);
    }

    #[test]
    fn failed_slice_aborts_and_restores() {
        let mut page = FakePage::new(1000);
        page.scroll_y = 150.0;
        page.fail_clip_at = Some(400);
        let res = SliceCapturer::new(small_config()).capture(&mut page);
        assert!(matches!(res, Err(Error::Capture(_))));
        assert!(!page.overridden);
        assert_eq!(page.scroll_y, 150.0);
    }

    #[test]
    fn scroll_steps_are_bounded() {
        let mut page = FakePage::new(100_000);
        let config = CaptureConfig { max_scroll_steps: 3, chunk_height: 50_000, ..small_config() };
        let captured = SliceCapturer::new(config).capture(&mut page).unwrap();
        assert_eq!(captured.slices.len(), 2);
    }
}
