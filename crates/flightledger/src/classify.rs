//! Flight classification.
//!
//! A [`FlightSession`] folds the signals of one flight into a single
//! [`Category`], decided once when the session ends. The worst squawk ever
//! observed decides the category, not the last one, and losing the signal
//! while a non-nominal code is on record files the flight as a crash.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

fn squawk_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-7]{4}$").expect("valid squawk pattern"))
}

/// A transponder code: four octal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Squawk(u16);

impl Squawk {
    /// Unlawful interference.
    pub const HIJACK: Self = Self(7500);
    /// Radio failure.
    pub const RADIO_FAILURE: Self = Self(7600);
    /// General emergency.
    pub const EMERGENCY: Self = Self(7700);
    /// Routine VFR flight.
    pub const VFR: Self = Self(1200);

    /// Parse a code such as `"7700"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSquawk`] unless the input is exactly four
    /// octal digits.
    pub fn parse(code: &str) -> Result<Self> {
        if !squawk_pattern().is_match(code) {
            return Err(Error::InvalidSquawk(code.to_string()));
        }
        code.parse::<u16>()
            .map(Self)
            .map_err(|_| Error::InvalidSquawk(code.to_string()))
    }

    /// The investigation category this code files a flight under, if any.
    #[must_use]
    pub fn emergency_category(self) -> Option<Category> {
        match self {
            Self::HIJACK => Some(Category::Hijack7500),
            Self::EMERGENCY => Some(Category::Emergency7700),
            Self::RADIO_FAILURE => Some(Category::RadioFailure7600),
            _ => None,
        }
    }
}

impl fmt::Display for Squawk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for Squawk {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Squawk {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Squawk> for String {
    fn from(squawk: Squawk) -> Self {
        squawk.to_string()
    }
}

/// Final classification of a flight.
///
/// Variants are declared in ascending severity, so `Ord` is the priority
/// order used when signals conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Routine flight.
    #[serde(rename = "STANDARD")]
    Standard,
    /// Squawked 7600 at some point.
    #[serde(rename = "RADIO_FAILURE_7600")]
    RadioFailure7600,
    /// Squawked 7700 at some point.
    #[serde(rename = "EMERGENCY_7700")]
    Emergency7700,
    /// Squawked 7500 at some point.
    #[serde(rename = "HIJACK_7500")]
    Hijack7500,
    /// Signal lost while a non-nominal code was on record.
    #[serde(rename = "CRASH")]
    Crash,
}

impl Category {
    /// Every category, in ascending severity.
    pub const ALL: [Self; 5] = [
        Self::Standard,
        Self::RadioFailure7600,
        Self::Emergency7700,
        Self::Hijack7500,
        Self::Crash,
    ];

    /// The canonical upper-case name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::RadioFailure7600 => "RADIO_FAILURE_7600",
            Self::Emergency7700 => "EMERGENCY_7700",
            Self::Hijack7500 => "HIJACK_7500",
            Self::Crash => "CRASH",
        }
    }

    /// Short operator-facing name, used in archive references.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Standard => "normal",
            Self::RadioFailure7600 => "radio_fail",
            Self::Emergency7700 => "emergency",
            Self::Hijack7500 => "security",
            Self::Crash => "crash",
        }
    }

    /// Directory under the archive root, `/`-separated.
    #[must_use]
    pub fn dir(self) -> &'static str {
        match self {
            Self::Standard => "standard_ops",
            Self::RadioFailure7600 => "investigation/7600_radio_loss",
            Self::Emergency7700 => "investigation/7700_emergency",
            Self::Hijack7500 => "investigation/7500_security",
            Self::Crash => "investigation/crashes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Category {
    type Err = Error;

    /// Accepts either the slug (`emergency`) or the name (`EMERGENCY_7700`).
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.slug() == s || c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidCategory(s.to_string()))
    }
}

/// Whether the flight's transport is still delivering signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityState {
    /// Signals are arriving.
    #[default]
    Connected,
    /// The signal was lost.
    Lost,
}

/// Factory for sessions sharing one set of nominal codes.
#[derive(Debug, Clone)]
pub struct Classifier {
    nominal: Arc<Vec<Squawk>>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(vec![Squawk::VFR])
    }
}

impl Classifier {
    /// Create a classifier treating `nominal` as routine codes.
    #[must_use]
    pub fn new(nominal: Vec<Squawk>) -> Self {
        Self {
            nominal: Arc::new(nominal),
        }
    }

    /// Codes considered routine for the crash rule.
    #[must_use]
    pub fn nominal(&self) -> &[Squawk] {
        &self.nominal
    }

    /// Start tracking a new flight.
    #[must_use]
    pub fn session(&self, plane_id: impl Into<String>) -> FlightSession {
        FlightSession {
            plane_id: plane_id.into(),
            history: Vec::new(),
            connectivity: ConnectivityState::Connected,
            landed: false,
            final_category: None,
            nominal: Arc::clone(&self.nominal),
        }
    }
}

/// Signal history of one flight.
#[derive(Debug, Clone)]
pub struct FlightSession {
    plane_id: String,
    history: Vec<(DateTime<Utc>, Squawk)>,
    connectivity: ConnectivityState,
    landed: bool,
    final_category: Option<Category>,
    nominal: Arc<Vec<Squawk>>,
}

impl FlightSession {
    /// The flight this session tracks.
    #[must_use]
    pub fn plane_id(&self) -> &str {
        &self.plane_id
    }

    /// Observed codes with the time they were observed, oldest first.
    #[must_use]
    pub fn history(&self) -> &[(DateTime<Utc>, Squawk)] {
        &self.history
    }

    /// Current connectivity.
    #[must_use]
    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity
    }

    /// Whether the flight reported a safe landing.
    #[must_use]
    pub fn has_landed(&self) -> bool {
        self.landed
    }

    /// The category, once finalized.
    #[must_use]
    pub fn final_category(&self) -> Option<Category> {
        self.final_category
    }

    /// Worst squawk observed so far, by category severity.
    #[must_use]
    pub fn worst_squawk(&self) -> Option<Squawk> {
        self.history
            .iter()
            .map(|&(_, code)| code)
            .max_by_key(|code| code.emergency_category())
    }

    /// Record a squawk. Also marks the flight as connected.
    pub fn on_squawk(&mut self, code: Squawk) {
        if self.ignore_if_final("squawk") {
            return;
        }
        if let Some(category) = code.emergency_category() {
            let already = self
                .history
                .iter()
                .any(|&(_, seen)| seen.emergency_category() >= Some(category));
            if !already {
                warn!("{} flagged: squawk {code}", self.plane_id);
            }
        }
        self.history.push((Utc::now(), code));
        self.connectivity = ConnectivityState::Connected;
    }

    /// Record loss of signal.
    pub fn on_disconnect(&mut self) {
        if self.ignore_if_final("disconnect") {
            return;
        }
        debug!("{} lost signal", self.plane_id);
        self.connectivity = ConnectivityState::Lost;
    }

    /// Record a safe landing. A landed flight is never filed as a crash.
    pub fn on_landed(&mut self) {
        if self.ignore_if_final("landed") {
            return;
        }
        debug!("{} landed", self.plane_id);
        self.landed = true;
    }

    /// Decide the category. The first call fixes it; later calls return the
    /// same value.
    pub fn finalize(&mut self) -> Category {
        if let Some(category) = self.final_category {
            return category;
        }
        let category = self.classify();
        info!("{} finalized as {category}", self.plane_id);
        self.final_category = Some(category);
        category
    }

    fn classify(&self) -> Category {
        let off_nominal = self
            .history
            .iter()
            .any(|(_, code)| !self.nominal.contains(code));

        if self.connectivity == ConnectivityState::Lost && !self.landed && off_nominal {
            return Category::Crash;
        }

        self.history
            .iter()
            .filter_map(|(_, code)| code.emergency_category())
            .max()
            .unwrap_or(Category::Standard)
    }

    fn ignore_if_final(&self, signal: &str) -> bool {
        if self.final_category.is_some() {
            warn!(
                "Ignoring {signal} for {}: session already finalized",
                self.plane_id
            );
            return true;
        }
        false
    }
}
