// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Captures formatted cache events for assertions in tests.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

use super::MemoActivity;
use super::attributes::CACHE_EVENT_NAME;

/// Collects everything a `fmt` subscriber writes and filters it down to cache events.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, cache events or not.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Lines emitted as `memo.event`.
    pub fn events(&self) -> Vec<String> {
        self.output()
            .lines()
            .filter(|line| line.contains(CACHE_EVENT_NAME))
            .map(str::to_owned)
            .collect()
    }

    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(
            output.contains(expected),
            "log output does not contain '{expected}', got:\n{output}"
        );
    }

    /// Number of cache events reporting `activity`.
    pub fn count(&self, activity: MemoActivity) -> usize {
        self.events()
            .iter()
            .filter(|line| line.contains(activity.as_str()))
            .count()
    }

    /// A subscriber writing plain text into this capture, for use with `set_default`.
    pub fn subscriber(&self) -> impl tracing::Subscriber {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish()
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_only_cache_events() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        tracing::info!(cache.activity = "memo.hit", "memo.event");
        tracing::info!(note = "memo.hit", "unrelated");

        assert_eq!(capture.events().len(), 1);
        assert_eq!(capture.count(MemoActivity::Hit), 1);
        assert_eq!(capture.count(MemoActivity::Miss), 0);
        capture.assert_contains("unrelated");
    }
}
