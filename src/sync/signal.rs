//! Synchronization signals
//!
//! Signals are opaque text. Three values are reserved for the run loop;
//! everything else is carried verbatim as a test payload.

use std::fmt;

/// Debuggee reached a barrier and is about to block
pub const SGNL_READY: &str = "ready";
/// Driver finished inspecting; debuggee may do another unit of work
pub const SGNL_CONTINUE: &str = "continue";
/// Debuggee is leaving its run loop
pub const SGNL_END: &str = "end";

/// A classified signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Ready,
    Continue,
    End,
    Custom(String),
}

impl Signal {
    pub fn as_str(&self) -> &str {
        match self {
            Signal::Ready => SGNL_READY,
            Signal::Continue => SGNL_CONTINUE,
            Signal::End => SGNL_END,
            Signal::Custom(text) => text,
        }
    }

    pub fn is_reserved(&self) -> bool {
        !matches!(self, Signal::Custom(_))
    }
}

impl From<&str> for Signal {
    fn from(text: &str) -> Self {
        match text {
            SGNL_READY => Signal::Ready,
            SGNL_CONTINUE => Signal::Continue,
            SGNL_END => Signal::End,
            other => Signal::Custom(other.to_string()),
        }
    }
}

impl From<String> for Signal {
    fn from(text: String) -> Self {
        match Signal::from(text.as_str()) {
            Signal::Custom(_) => Signal::Custom(text),
            reserved => reserved,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_exact() {
        assert_eq!(Signal::from("ready"), Signal::Ready);
        assert_eq!(Signal::from("continue"), Signal::Continue);
        assert_eq!(Signal::from("end"), Signal::End);
        assert_eq!(Signal::from("END"), Signal::Custom("END".to_string()));
        assert_eq!(Signal::from(" ready"), Signal::Custom(" ready".to_string()));
        assert!(!Signal::from("breakpoint hit").is_reserved());
    }

    #[test]
    fn test_custom_round_trips_verbatim() {
        let text = "value=42; name=\"x\"";
        assert_eq!(Signal::from(text.to_string()).as_str(), text);
    }
}
