//! Page-control channel abstraction
//!
//! The capture pipeline never talks to a browser directly. It drives a
//! [`PageControl`] handle obtained from a [`Connector`], wrapped in a
//! [`Session`] that detaches the handle on every exit path.

use crate::Result;
use log::{debug, warn};
use serde_json::Value;
use std::ops::{Deref, DerefMut};

/// Layout metrics reported by the page-control channel, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutMetrics {
    pub content_width: f64,
    pub content_height: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

/// Device metrics override applied while capturing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceMetrics {
    pub width: u32,
    pub height: u32,
    /// 0 keeps the device's native scale factor
    pub device_scale_factor: f64,
    pub mobile: bool,
}

/// A rectangular region of the page, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clip {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Commands the capture pipeline needs from an attached page.
///
/// Transport failures are reported as `Error::Connection`.
pub trait PageControl {
    /// Enable the page and runtime domains
    fn enable_domains(&mut self) -> Result<()>;

    /// Evaluate a script expression and return its JSON value
    fn evaluate(&mut self, expression: &str) -> Result<Value>;

    /// Read the page's layout metrics
    fn layout_metrics(&mut self) -> Result<LayoutMetrics>;

    /// Override viewport width/height/scale
    fn set_device_metrics(&mut self, metrics: &DeviceMetrics) -> Result<()>;

    /// Clear a previously applied device metrics override
    fn clear_device_metrics(&mut self) -> Result<()>;

    /// Capture `clip` as PNG bytes with beyond-viewport semantics
    fn capture_clip(&mut self, clip: &Clip) -> Result<Vec<u8>>;

    /// Release the handle. Called exactly once by [`Session`].
    fn detach(&mut self) -> Result<()>;
}

/// Source of page-control handles
pub trait Connector {
    type Control: PageControl;

    /// Attach to `target` (a page URL). Fails with `Error::Connection` when
    /// the target is unreachable.
    fn attach(&mut self, target: &str) -> Result<Self::Control>;
}

/// Exclusive, scoped ownership of an attached page.
///
/// Call [`Session::release`] to detach and observe the result; a session
/// dropped without release (early return, panic) detaches in `Drop` and
/// logs any failure.
pub struct Session<P: PageControl> {
    control: P,
    target: String,
    released: bool,
}

impl<P: PageControl> Session<P> {
    /// Attach through `connector` and wrap the handle
    pub fn attach<C>(connector: &mut C, target: &str) -> Result<Self>
    where
        C: Connector<Control = P>,
    {
        let control = connector.attach(target)?;
        debug!("attached page-control session to {}", target);
        Ok(Self::from_control(control, target))
    }

    /// Wrap an already attached handle
    pub fn from_control(control: P, target: &str) -> Self {
        Self {
            control,
            target: target.to_string(),
            released: false,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Detach the handle
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        debug!("detaching page-control session from {}", self.target);
        self.control.detach()
    }
}

impl<P: PageControl> Deref for Session<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.control
    }
}

impl<P: PageControl> DerefMut for Session<P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.control
    }
}

impl<P: PageControl> Drop for Session<P> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.control.detach() {
            warn!("Failed to detach page-control session from {}: {}", self.target, e);
        }
    }
}
