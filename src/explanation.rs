//! [`Explanation`] is the append-only trace attached to each scheduling candidate and each
//! finished [`ScheduledInstance`](crate::scheduler::ScheduledInstance). Bounded the same way the
//! teacher crate bounds its own diagnostic ring buffers: a hard cap, an overflow marker, never a
//! silent unbounded `Vec` growth.

/// Hard cap on the number of effective lines an [`Explanation`] will hold; one further overflow
/// notice may follow once the cap is reached, and all subsequent appends are silently discarded.
pub const MAX_LINES: usize = 100;

/// An append-only, capped trace of the decisions that produced a scheduling candidate or
/// instance. No reordering, no deletion — only [`Explanation::push`] mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Explanation {
    lines: Vec<String>,
    overflowed: bool,
}

impl Explanation {
    /// An empty trace.
    pub fn new() -> Self {
        Explanation::default()
    }

    /// Appends `line`. Once [`MAX_LINES`] effective lines have been recorded, the 101st append
    /// instead records a single overflow notice, and every append after that is a no-op.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.overflowed {
            return;
        }
        if self.lines.len() >= MAX_LINES {
            self.lines.push("... explanation truncated, further entries discarded".to_string());
            self.overflowed = true;
            return;
        }
        self.lines.push(line.into());
    }

    /// The recorded lines, in append order, including the overflow notice if present.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// `true` once the cap has been reached and an overflow notice recorded.
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Joins the recorded lines with `\n`, for embedding in human-readable output (e.g. the
    /// iCalendar `DESCRIPTION` field).
    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_explanation_has_no_lines() {
        let explanation = Explanation::new();
        assert!(explanation.lines().is_empty());
        assert!(!explanation.is_overflowed());
    }

    #[test]
    fn pushes_beyond_the_cap_are_capped_with_a_single_overflow_notice() {
        let mut explanation = Explanation::new();
        for i in 0..150 {
            explanation.push(format!("line {i}"));
        }
        assert_eq!(explanation.lines().len(), MAX_LINES + 1);
        assert!(explanation.is_overflowed());
        // Further pushes are no-ops.
        explanation.push("dropped");
        assert_eq!(explanation.lines().len(), MAX_LINES + 1);
    }

    #[test]
    fn to_text_joins_with_newlines() {
        let mut explanation = Explanation::new();
        explanation.push("a");
        explanation.push("b");
        assert_eq!(explanation.to_text(), "a\nb");
    }
}
