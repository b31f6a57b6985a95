//! The user-facing console transcript.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Append-only sequence of human-readable log lines.
///
/// Reset at the start of each run or deploy; never shared between attempts.
/// Appends take `&self` so a strategy can log while other parts of the
/// orchestrator read the transcript.
///
/// Every reset starts a new cycle. Work that outlives its cycle writes with
/// [`Transcript::push_in`] and is dropped once a newer cycle has begun.
#[derive(Debug, Default)]
pub struct Transcript {
    inner: Mutex<Lines>,
}

#[derive(Debug, Default)]
struct Lines {
    cycle: u64,
    lines: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(line = %line, "transcript");
        self.guard().lines.push(line);
    }

    /// Append `line` only if the transcript is still in `cycle`.
    ///
    /// Returns whether the line was written.
    pub fn push_in(&self, cycle: u64, line: impl Into<String>) -> bool {
        let mut inner = self.guard();
        if inner.cycle != cycle {
            return false;
        }
        let line = line.into();
        tracing::debug!(line = %line, cycle, "transcript");
        inner.lines.push(line);
        true
    }

    /// The current cycle.
    pub fn cycle(&self) -> u64 {
        self.guard().cycle
    }

    /// Drop all lines and start a new cycle.
    pub(crate) fn clear(&self) {
        let mut inner = self.guard();
        inner.lines.clear();
        inner.cycle += 1;
    }

    /// Copy of the current lines.
    pub fn lines(&self) -> Vec<String> {
        self.guard().lines.clone()
    }

    pub fn len(&self) -> usize {
        self.guard().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().lines.is_empty()
    }

    /// Whether any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.guard().lines.iter().any(|line| line.contains(needle))
    }

    fn guard(&self) -> MutexGuard<'_, Lines> {
        // A panic while holding the lock cannot leave the lines half-written.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.guard().lines.iter() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_clear() {
        let transcript = Transcript::new();
        transcript.push("▶ Compiling contract...");
        transcript.push("✓ Contract compiled successfully");
        assert_eq!(transcript.len(), 2);
        assert!(transcript.contains("compiled"));
        assert_eq!(
            transcript.to_string(),
            "▶ Compiling contract...\n✓ Contract compiled successfully\n"
        );

        transcript.clear();
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_push_in_drops_lines_from_an_old_cycle() {
        let transcript = Transcript::new();
        let cycle = transcript.cycle();
        assert!(transcript.push_in(cycle, "✓ Transaction hash: abc"));

        transcript.clear();
        assert!(!transcript.push_in(cycle, "✓ Transaction hash: late"));
        assert!(transcript.is_empty());
        assert!(transcript.push_in(transcript.cycle(), "▶ Compiling contract..."));
        assert_eq!(transcript.len(), 1);
    }
}
