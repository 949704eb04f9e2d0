//! Process-wide shutdown signalling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag raised once when the process starts exiting. Clones share the same
/// flag. There is no way to lower it again.
#[derive(Clone, Debug, Default)]
pub struct ExitFlag {
    exiting: Arc<AtomicBool>,
}

impl ExitFlag {
    /// Constructor.
    pub fn new() -> Self {
        Default::default()
    }

    /// Ask every long-running loop holding this flag to stop.
    pub fn raise(&self) {
        self.exiting.store(true, Ordering::SeqCst);
    }

    #[allow(missing_docs)]
    pub fn is_raised(&self) -> bool {
        self.exiting.load(Ordering::SeqCst)
    }
}
