//! Scripted page-control double shared by the integration tests

#![allow(dead_code)]

use image::{ImageFormat, Rgba, RgbaImage};
use pagestitch::capture::scripts;
use pagestitch::control::{Clip, Connector, DeviceMetrics, LayoutMetrics, PageControl};
use pagestitch::{CaptureConfig, CaptureMode, Error, Result, SessionConfig};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Observable state of the fake page
#[derive(Debug, Default)]
pub struct PageState {
    pub height: u32,
    pub scroll_y: f64,
    pub overridden: bool,
    pub attaches: usize,
    pub detaches: usize,
    pub clips: Vec<Clip>,
    pub fail_clip_at: Option<u32>,
}

/// Color of logical row `y` on the fake page
pub fn row_color(y: u32) -> Rgba<u8> {
    Rgba([(y % 256) as u8, ((y / 256) % 256) as u8, 100, 255])
}

pub struct ScriptedPage {
    state: Arc<Mutex<PageState>>,
    scale: u32,
}

impl PageControl for ScriptedPage {
    fn enable_domains(&mut self) -> Result<()> {
        Ok(())
    }

    fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        if expression == scripts::SCROLL_POSITION {
            return Ok(json!({"x": 0, "y": state.scroll_y}));
        }
        if expression == scripts::SCROLL_HEIGHT || expression == scripts::DOM_HEIGHT {
            return Ok(json!(state.height));
        }
        if let Some(rest) = expression.strip_prefix(scripts::SCROLL_TO_PREFIX) {
            let y = rest
                .split(',')
                .nth(1)
                .and_then(|s| s.trim().trim_end_matches(')').parse::<f64>().ok())
                .unwrap_or(0.0);
            state.scroll_y = y;
            return Ok(json!(y));
        }
        Ok(Value::Null)
    }

    fn layout_metrics(&mut self) -> Result<LayoutMetrics> {
        let state = self.state.lock().unwrap();
        Ok(LayoutMetrics {
            content_height: f64::from(state.height),
            ..Default::default()
        })
    }

    fn set_device_metrics(&mut self, _metrics: &DeviceMetrics) -> Result<()> {
        self.state.lock().unwrap().overridden = true;
        Ok(())
    }

    fn clear_device_metrics(&mut self) -> Result<()> {
        self.state.lock().unwrap().overridden = false;
        Ok(())
    }

    fn capture_clip(&mut self, clip: &Clip) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        if state.fail_clip_at == Some(clip.y as u32) {
            return Err(Error::Connection("target crashed".into()));
        }
        state.clips.push(*clip);
        let scale = self.scale;
        let top = clip.y as u32;
        let img = RgbaImage::from_fn(clip.width as u32 * scale, clip.height as u32 * scale, |_, py| {
            row_color(top + py / scale)
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        Ok(out.into_inner())
    }

    fn detach(&mut self) -> Result<()> {
        self.state.lock().unwrap().detaches += 1;
        Ok(())
    }
}

/// Connector handing out [`ScriptedPage`]s over shared state
#[derive(Clone)]
pub struct ScriptedConnector {
    pub state: Arc<Mutex<PageState>>,
    pub scale: u32,
    pub reachable: bool,
}

impl ScriptedConnector {
    pub fn new(height: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(PageState {
                height,
                ..Default::default()
            })),
            scale: 1,
            reachable: true,
        }
    }
}

impl Connector for ScriptedConnector {
    type Control = ScriptedPage;

    fn attach(&mut self, target: &str) -> Result<ScriptedPage> {
        if !self.reachable {
            return Err(Error::Connection(format!("{} is unreachable", target)));
        }
        self.state.lock().unwrap().attaches += 1;
        Ok(ScriptedPage {
            state: self.state.clone(),
            scale: self.scale,
        })
    }
}

/// Narrow, delay-free config so tests stay fast
pub fn test_config() -> CaptureConfig {
    CaptureConfig {
        capture_width: 64,
        viewport_height: 1000,
        ..CaptureConfig::without_delays()
    }
}

pub fn flow_session() -> SessionConfig {
    SessionConfig {
        mode: CaptureMode::Flow,
        date: "2026-02-09".into(),
        language: "en".into(),
        flow_or_set_name: "Guest Checkout".into(),
        login_state: "logged-in".into(),
        version: "v3.12.0".into(),
    }
}
