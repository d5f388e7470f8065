//! Change descriptions recorded by every successful mutation.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTarget {
    Node,
    Link,
    Curve,
    Pattern,
    /// Controls are identified by their text form.
    Control,
}

impl ChangeTarget {
    pub fn name(self) -> &'static str {
        match self {
            ChangeTarget::Node => "node",
            ChangeTarget::Link => "link",
            ChangeTarget::Curve => "curve",
            ChangeTarget::Pattern => "pattern",
            ChangeTarget::Control => "control",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkChange {
    Added { target: ChangeTarget, id: String },
    Removed { target: ChangeTarget, id: String },
    Updated { target: ChangeTarget, id: String },
    LinkReversed { id: String },
    /// The whole network was swapped for a newly loaded one.
    Replaced,
}

impl fmt::Display for NetworkChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkChange::Added { target, id } => write!(f, "added {} {}", target.name(), id),
            NetworkChange::Removed { target, id } => write!(f, "removed {} {}", target.name(), id),
            NetworkChange::Updated { target, id } => write!(f, "updated {} {}", target.name(), id),
            NetworkChange::LinkReversed { id } => write!(f, "reversed link {id}"),
            NetworkChange::Replaced => f.write_str("replaced network"),
        }
    }
}
