use std::sync::Arc;

use parking_lot::Mutex;

/// Destination for text the target prints.
pub trait OutputSink: Send + Sync {
    fn write_str(&self, text: &str);
}

/// Append/read buffer capturing a target's output. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<String>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.inner.lock().clone()
    }
}

impl OutputSink for OutputBuffer {
    fn write_str(&self, text: &str) {
        self.inner.lock().push_str(text);
    }
}
