use std::fmt;

/// A directed, labelled edge: `initiator` did something to `target` in
/// `context` (a machine id, a process tree, ...).
///
/// Field order matters: the derived ordering sorts by context, then
/// initiator, then target, which is the order crawl results are reported in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interaction {
    pub context: String,
    pub initiator: String,
    pub target: String,
}

impl Interaction {
    pub fn new(
        context: impl Into<String>,
        initiator: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            initiator: initiator.into(),
            target: target.into(),
        }
    }
}

/// Formats as a telemetry line: `context initiator target`.
impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.context, self.initiator, self.target)
    }
}
