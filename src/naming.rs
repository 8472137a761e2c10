//! Deterministic file and folder naming
//!
//! Every user-supplied name that ends up in a path goes through [`sanitize`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Language tag embedded in every artifact filename
pub const LANGUAGE_TAG: &str = "en";

/// Root folder for all capture output
pub const ROOT_FOLDER: &str = "Exemplars";

/// How captures in a session relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Ordered steps of a single user flow (`Step07_...`)
    Flow,
    /// Unordered set of landing pages (`LP07_...`)
    Set,
}

impl CaptureMode {
    /// Filename prefix placed before the zero-padded index
    pub fn prefix(self) -> &'static str {
        match self {
            CaptureMode::Flow => "Step",
            CaptureMode::Set => "LP",
        }
    }

    /// Human label used in folder names, the overlay and the manifest
    pub fn label(self) -> &'static str {
        match self {
            CaptureMode::Flow => "Flow",
            CaptureMode::Set => "Set",
        }
    }

    /// Label for the per-capture index in the overlay
    pub fn index_label(self) -> &'static str {
        match self {
            CaptureMode::Flow => "Step",
            CaptureMode::Set => "Index",
        }
    }

    /// Mode named by `label`, ignoring case and surrounding whitespace
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "flow" => Some(CaptureMode::Flow),
            "set" => Some(CaptureMode::Set),
            _ => None,
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strip everything but ASCII letters, digits, spaces and hyphens, then
/// title-case each space/hyphen separated token and concatenate.
///
/// ```
/// assert_eq!(pagestitch::naming::sanitize("Checkout Page!"), "CheckoutPage");
/// assert_eq!(pagestitch::naming::sanitize("logged-in"), "LoggedIn");
/// ```
pub fn sanitize(text: &str) -> String {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-')
        .collect();

    kept.split([' ', '-'])
        .filter(|token| !token.is_empty())
        .map(title_case)
        .collect()
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first
            .to_ascii_uppercase()
            .to_string()
            + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Artifact filename:
/// `{Step|LP}{NN}_{Page}_{Login}_{lang}_{version}_{date}.{ext}`
pub fn generate_filename(
    mode: CaptureMode,
    index: u32,
    page_name: &str,
    login_state: &str,
    version: &str,
    date: &str,
    extension: &str,
) -> String {
    format!(
        "{}{:02}_{}_{}_{}_{}_{}.{}",
        mode.prefix(),
        index,
        sanitize(page_name),
        sanitize(login_state),
        LANGUAGE_TAG,
        version,
        date,
        extension
    )
}

/// Folder shared by every capture of one `(date, version)` pair
pub fn session_folder(date: &str, version: &str) -> String {
    format!("{}/{}_{}/", ROOT_FOLDER, date, version)
}

/// Artifact folder: `Exemplars/{date}_{version}/{ModeLabel}_{Name}/`
pub fn folder_path(date: &str, version: &str, mode: CaptureMode, name: &str) -> String {
    format!("{}{}_{}/", session_folder(date, version), mode.label(), sanitize(name))
}

/// Manifest ledger filename for one `(date, version)` pair
pub fn manifest_filename(date: &str, version: &str) -> String {
    format!("Manifest_{}_{}.csv", date, version)
}
