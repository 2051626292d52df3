use tokio::sync::watch;

/// Best-effort percent-complete notification. Values stay below 100 during
/// import; 100 is reserved for the orchestrator's completion report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub current: u64,
    pub total: u64,
}

/// Running totals for one orchestrator run. `total` is a best-effort
/// pre-flight estimate (0 when unknown) and never decreases.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressState {
    pub current: u64,
    pub total: u64,
}

/// Fire-and-forget progress sink. A `watch` channel keeps only the latest
/// value and `send_replace` cannot fail, so emitting with no listener is a
/// silent no-op rather than an error.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<ProgressUpdate>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressUpdate::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressUpdate> {
        self.tx.subscribe()
    }

    pub fn emit(&self, state: ProgressState) {
        let percent = if state.total == 0 {
            0
        } else {
            ((state.current * 100) / state.total).min(99) as u8
        };
        self.tx.send_replace(ProgressUpdate {
            percent,
            current: state.current,
            total: state.total,
        });
    }

    /// Final notification once a run has finished successfully.
    pub fn emit_complete(&self, state: ProgressState) {
        self.tx.send_replace(ProgressUpdate {
            percent: 100,
            current: state.current,
            total: state.total,
        });
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
