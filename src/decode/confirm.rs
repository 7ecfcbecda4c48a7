//! Confirmation of decode results over consecutive camera frames.

/// Consecutive identical reads needed before a result counts as confirmed.
pub const DEFAULT_CONFIRM_THRESHOLD: u32 = 4;

/// Filters single-frame misreads out of a stream of decode results.
///
/// A text is confirmed once, when it has been seen `threshold` times in a row.
/// A different text or a miss restarts the count.
#[derive(Debug, Clone)]
pub struct ResultConfirmer {
    threshold: u32,
    last: Option<String>,
    count: u32,
}

impl ResultConfirmer {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            last: None,
            count: 0,
        }
    }

    /// Feeds one result; returns the text the moment it becomes confirmed.
    pub fn observe(&mut self, text: Option<&str>) -> Option<String> {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            self.reset();
            return None;
        };

        if self.last.as_deref() == Some(text) {
            self.count = self.count.saturating_add(1);
        } else {
            self.last = Some(text.to_string());
            self.count = 1;
        }

        (self.count == self.threshold).then(|| text.to_string())
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.count = 0;
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

impl Default for ResultConfirmer {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_THRESHOLD)
    }
}
