//! Port-range enforcement for kernel transport ports.
//!
//! # Responsibilities
//! - Parse `lower..upper` ranges (`0..0` disables enforcement)
//! - Draw candidate ports pseudo-randomly from the range
//! - Reserve free ports by binding, retrying on bind failure
//!
//! Drawing does not guarantee exclusivity against other processes using the
//! same band; `reserve` binds each candidate to confirm it is free.

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, TcpListener};
use std::str::FromStr;

use rand::Rng;

use crate::error::{GatewayError, Result};

/// Bind attempts per requested port before giving up.
const MAX_ATTEMPTS_PER_PORT: usize = 100;

/// Inclusive port band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub lower: u16,
    pub upper: u16,
}

impl PortRange {
    pub const DISABLED: PortRange = PortRange { lower: 0, upper: 0 };

    pub fn new(lower: u16, upper: u16) -> Result<Self> {
        let range = Self { lower, upper };
        if !range.is_disabled() && lower > upper {
            return Err(GatewayError::config(format!(
                "invalid port range '{}..{}': lower bound exceeds upper bound",
                lower, upper
            )));
        }
        Ok(range)
    }

    pub fn is_disabled(&self) -> bool {
        self.lower == 0 && self.upper == 0
    }

    pub fn len(&self) -> usize {
        if self.is_disabled() {
            0
        } else {
            usize::from(self.upper - self.lower) + 1
        }
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::DISABLED
    }
}

impl FromStr for PortRange {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let (lower, upper) = s
            .split_once("..")
            .ok_or_else(|| GatewayError::config(format!("invalid port range '{}': expected lower..upper", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u16>()
                .map_err(|_| GatewayError::config(format!("invalid port range '{}': '{}' is not a port", s, part)))
        };
        Self::new(parse(lower)?, parse(upper)?)
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.lower, self.upper)
    }
}

/// Outcome of a single draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortChoice {
    /// Enforcement disabled; let the OS pick.
    Unconstrained,
    Port(u16),
}

/// Draws and reserves ports from a [`PortRange`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PortAllocator {
    range: PortRange,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    pub fn allocate(&self) -> PortChoice {
        if self.range.is_disabled() {
            return PortChoice::Unconstrained;
        }
        PortChoice::Port(rand::thread_rng().gen_range(self.range.lower..=self.range.upper))
    }

    /// Reserve `count` distinct ports that are currently bindable on this host.
    pub fn reserve(&self, count: usize) -> Result<Vec<u16>> {
        if !self.range.is_disabled() && self.range.len() < count {
            return Err(GatewayError::Launch(format!(
                "port range {} cannot supply {} ports",
                self.range, count
            )));
        }

        let mut chosen = BTreeSet::new();
        let mut ports = Vec::with_capacity(count);
        // Listeners stay open until every port is chosen so the OS does not
        // hand the same ephemeral port out twice.
        let mut held = Vec::with_capacity(count);

        let mut attempts = 0;
        while ports.len() < count {
            if attempts >= MAX_ATTEMPTS_PER_PORT * count {
                return Err(GatewayError::Launch(format!(
                    "no free port found in range {} after {} attempts",
                    self.range, attempts
                )));
            }
            attempts += 1;

            let candidate = match self.allocate() {
                PortChoice::Unconstrained => 0,
                PortChoice::Port(port) if chosen.contains(&port) => continue,
                PortChoice::Port(port) => port,
            };
            match TcpListener::bind((Ipv4Addr::UNSPECIFIED, candidate)) {
                Ok(listener) => {
                    let port = listener.local_addr()?.port();
                    if chosen.insert(port) {
                        ports.push(port);
                    }
                    held.push(listener);
                }
                Err(e) => {
                    tracing::debug!(port = candidate, error = %e, "Port unavailable, retrying");
                }
            }
        }
        Ok(ports)
    }
}
