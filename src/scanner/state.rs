// SPDX-License-Identifier: GPL-3.0-only

//! Scanner state machine

/// Lifecycle state of a [`ScannerController`](super::ScannerController)
///
/// ```text
///          Start           Freeze
///   Idle ─────────▶ Scanning ──────▶ Frozen
///    ▲                │   ◀────────    │
///    │      Stop      │    Unfreeze    │
///    └────────────────┴────────────────┘
///                   Stop
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScannerState {
    /// No session; nothing bound
    #[default]
    Idle,
    /// Session running, preview live, results delivered
    Scanning,
    /// Session running, preview shows a still, results withheld
    Frozen,
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerEvent {
    Start,
    Stop,
    Freeze,
    Unfreeze,
}

impl ScannerState {
    /// State after `event`, or `None` if the transition is not allowed
    pub fn apply(self, event: ScannerEvent) -> Option<ScannerState> {
        use ScannerEvent::*;
        use ScannerState::*;

        match (self, event) {
            (Idle, Start) => Some(Scanning),
            (Scanning | Frozen, Stop) => Some(Idle),
            (Scanning, Freeze) => Some(Frozen),
            (Frozen, Unfreeze) => Some(Scanning),
            _ => None,
        }
    }

    /// Whether a capture session is running
    pub fn is_live(self) -> bool {
        !matches!(self, ScannerState::Idle)
    }
}

impl std::fmt::Display for ScannerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScannerState::Idle => write!(f, "idle"),
            ScannerState::Scanning => write!(f, "scanning"),
            ScannerState::Frozen => write!(f, "frozen"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [ScannerState; 3] = [
        ScannerState::Idle,
        ScannerState::Scanning,
        ScannerState::Frozen,
    ];
    const EVENTS: [ScannerEvent; 4] = [
        ScannerEvent::Start,
        ScannerEvent::Stop,
        ScannerEvent::Freeze,
        ScannerEvent::Unfreeze,
    ];

    #[test]
    fn test_allowed_transitions() {
        let allowed: Vec<_> = STATES
            .iter()
            .flat_map(|&s| EVENTS.iter().filter_map(move |&e| s.apply(e).map(|n| (s, e, n))))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (ScannerState::Idle, ScannerEvent::Start, ScannerState::Scanning),
                (ScannerState::Scanning, ScannerEvent::Stop, ScannerState::Idle),
                (ScannerState::Scanning, ScannerEvent::Freeze, ScannerState::Frozen),
                (ScannerState::Frozen, ScannerEvent::Stop, ScannerState::Idle),
                (ScannerState::Frozen, ScannerEvent::Unfreeze, ScannerState::Scanning),
            ]
        );
    }

    #[test]
    fn test_frozen_never_returns_to_idle_except_by_stop() {
        for event in EVENTS {
            if let Some(next) = ScannerState::Frozen.apply(event) {
                assert!(next == ScannerState::Scanning || event == ScannerEvent::Stop);
            }
        }
    }

    #[test]
    fn test_liveness() {
        assert!(!ScannerState::Idle.is_live());
        assert!(ScannerState::Scanning.is_live());
        assert!(ScannerState::Frozen.is_live());
    }
}
