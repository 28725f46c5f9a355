use std::time::Duration;

use tokio::time::Instant;

/// Throttles the typing signals sent by the local participant.
///
/// "Started typing" is sent once per idle to typing transition, "stopped typing" once no
/// keystroke happened for `idle_after`.
#[derive(Clone, Debug)]
pub struct TypingThrottle {
    idle_after: Duration,
    last_keystroke: Option<Instant>,
}

impl TypingThrottle {
    pub fn new(idle_after: Duration) -> TypingThrottle {
        TypingThrottle {
            idle_after,
            last_keystroke: None,
        }
    }

    pub fn is_typing(&self) -> bool {
        self.last_keystroke.is_some()
    }

    /// Returns the signal to send, if any
    pub fn keystroke(&mut self, now: Instant) -> Option<bool> {
        let was_typing = self.last_keystroke.replace(now).is_some();
        (!was_typing).then_some(true)
    }

    /// Returns `Some(false)` when the idle delay elapsed since the last keystroke
    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        match self.deadline() {
            Some(deadline) if deadline <= now => {
                self.last_keystroke = None;
                Some(false)
            }
            _ => None,
        }
    }

    /// Stops typing right away, eg. on submit. Returns the signal to send, if any.
    pub fn stop(&mut self) -> Option<bool> {
        self.last_keystroke.take().map(|_| false)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.last_keystroke.map(|t| t + self.idle_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_transitions_only() {
        let mut th = TypingThrottle::new(Duration::from_secs(2));
        let start = Instant::now();
        assert_eq!(th.keystroke(start), Some(true));
        assert_eq!(th.keystroke(start + Duration::from_millis(500)), None);
        assert_eq!(th.poll(start + Duration::from_millis(2499)), None);
        assert_eq!(th.poll(start + Duration::from_millis(2500)), Some(false));
        assert_eq!(th.poll(start + Duration::from_secs(10)), None);
        assert_eq!(th.keystroke(start + Duration::from_secs(11)), Some(true));
    }

    #[test]
    fn stop_is_immediate() {
        let mut th = TypingThrottle::new(Duration::from_secs(2));
        assert_eq!(th.stop(), None);
        th.keystroke(Instant::now());
        assert!(th.is_typing());
        assert_eq!(th.stop(), Some(false));
        assert_eq!(th.deadline(), None);
    }
}
