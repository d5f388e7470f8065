//! Simple link controls.
//!
//! A control changes one link's status or setting when a node value crosses
//! a threshold, or at a given elapsed or clock time. The text form is
//! `LINK <link> <action> IF NODE <node> ABOVE|BELOW <value>`,
//! `LINK <link> <action> AT TIME <h:mm>` or
//! `LINK <link> <action> AT CLOCKTIME <h:mm>`.

use core::fmt;
use core::str::FromStr;

use crate::error::{NetworkError, NetworkResult};

pub const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    Open,
    Closed,
    /// Pump relative speed or valve setting; opens the link.
    Setting(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlTrigger {
    /// Tank level, reservoir head or junction pressure rises above `value`.
    NodeAbove { node: String, value: f64 },
    NodeBelow { node: String, value: f64 },
    /// Elapsed simulation time.
    AtTime { time_s: u64 },
    /// Time of day, repeating every 24 h.
    AtClockTime { time_of_day_s: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub link: String,
    pub action: ControlAction,
    pub trigger: ControlTrigger,
}

impl Control {
    pub fn new(link: impl Into<String>, action: ControlAction, trigger: ControlTrigger) -> Self {
        Self {
            link: link.into(),
            action,
            trigger,
        }
    }

    /// Node watched by the trigger, if any.
    pub fn node(&self) -> Option<&str> {
        match &self.trigger {
            ControlTrigger::NodeAbove { node, .. } | ControlTrigger::NodeBelow { node, .. } => {
                Some(node)
            }
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> NetworkResult<()> {
        if self.link.is_empty() {
            return Err(self.invalid("link id must not be empty"));
        }
        if let ControlAction::Setting(v) = self.action
            && !(v.is_finite() && v >= 0.0)
        {
            return Err(self.invalid("setting must be finite and non-negative"));
        }
        match &self.trigger {
            ControlTrigger::NodeAbove { node, value } | ControlTrigger::NodeBelow { node, value } => {
                if node.is_empty() {
                    return Err(self.invalid("node id must not be empty"));
                }
                if !value.is_finite() {
                    return Err(self.invalid("threshold must be finite"));
                }
            }
            ControlTrigger::AtTime { .. } => {}
            ControlTrigger::AtClockTime { time_of_day_s } => {
                if *time_of_day_s >= SECONDS_PER_DAY {
                    return Err(self.invalid("clock time must be within one day"));
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> NetworkError {
        NetworkError::InvalidControl {
            control: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAction::Open => f.write_str("OPEN"),
            ControlAction::Closed => f.write_str("CLOSED"),
            ControlAction::Setting(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LINK {} {} ", self.link, self.action)?;
        match &self.trigger {
            ControlTrigger::NodeAbove { node, value } => write!(f, "IF NODE {node} ABOVE {value}"),
            ControlTrigger::NodeBelow { node, value } => write!(f, "IF NODE {node} BELOW {value}"),
            ControlTrigger::AtTime { time_s } => write!(f, "AT TIME {}", Clock(*time_s)),
            ControlTrigger::AtClockTime { time_of_day_s } => {
                write!(f, "AT CLOCKTIME {}", Clock(*time_of_day_s))
            }
        }
    }
}

/// `h:mm`, or `h:mm:ss` when seconds are present.
struct Clock(u64);

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = (self.0 / 3600, self.0 / 60 % 60, self.0 % 60);
        if s == 0 {
            write!(f, "{h}:{m:02}")
        } else {
            write!(f, "{h}:{m:02}:{s:02}")
        }
    }
}

/// Decimal hours (`2.5`) or `h[:mm[:ss]]`.
fn parse_clock(text: &str) -> Option<u64> {
    if !text.contains(':') {
        let hours: f64 = text.parse().ok()?;
        return (hours.is_finite() && hours >= 0.0).then(|| (hours * 3600.0).round() as u64);
    }
    let mut total = 0u64;
    let mut parts = 0;
    for (i, part) in text.split(':').enumerate() {
        let v: u64 = part.parse().ok()?;
        if i > 0 && v >= 60 {
            return None;
        }
        total = total * 60 + v;
        parts = i + 1;
    }
    match parts {
        2 => Some(total * 60),
        3 => Some(total),
        _ => None,
    }
}

impl FromStr for Control {
    type Err = NetworkError;

    /// Keywords are case-insensitive. Clock times accept a trailing AM/PM.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let bad = |reason: &str| NetworkError::InvalidControl {
            control: text.trim().to_string(),
            reason: reason.to_string(),
        };
        let words: Vec<&str> = text.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        if words.len() < 5 || upper[0] != "LINK" {
            return Err(bad("expected LINK <id> <action> ..."));
        }
        let link = words[1].to_string();
        let action = match upper[2].as_str() {
            "OPEN" => ControlAction::Open,
            "CLOSED" => ControlAction::Closed,
            other => ControlAction::Setting(
                other
                    .parse()
                    .map_err(|_| bad("action must be OPEN, CLOSED or a number"))?,
            ),
        };
        let rest: Vec<&str> = upper[3..].iter().map(String::as_str).collect();
        let trigger = match rest.as_slice() {
            ["IF", "NODE", _, op, value] => {
                let node = words[5].to_string();
                let value: f64 = value.parse().map_err(|_| bad("threshold is not a number"))?;
                match *op {
                    "ABOVE" => ControlTrigger::NodeAbove { node, value },
                    "BELOW" => ControlTrigger::NodeBelow { node, value },
                    _ => return Err(bad("comparison must be ABOVE or BELOW")),
                }
            }
            ["AT", "TIME", time] => ControlTrigger::AtTime {
                time_s: parse_clock(time).ok_or_else(|| bad("unreadable time"))?,
            },
            ["AT", "CLOCKTIME", time, meridiem @ ..] => {
                let mut secs = parse_clock(time).ok_or_else(|| bad("unreadable clock time"))?;
                match meridiem {
                    [] => {}
                    [m] if *m == "AM" || *m == "PM" => {
                        if !(3600..13 * 3600).contains(&secs) {
                            return Err(bad("12-hour clock time out of range"));
                        }
                        secs %= 12 * 3600;
                        if *m == "PM" {
                            secs += 12 * 3600;
                        }
                    }
                    _ => return Err(bad("clock time suffix must be AM or PM")),
                }
                ControlTrigger::AtClockTime {
                    time_of_day_s: secs,
                }
            }
            _ => return Err(bad("expected IF NODE, AT TIME or AT CLOCKTIME")),
        };
        let control = Control::new(link, action, trigger);
        control.validate()?;
        Ok(control)
    }
}
