use std::cell::Cell;
use std::fmt;

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecKind {
    Execute,
    Load,
    Create,
    Update,
    Delete,
    Commit,
    Rollback,
}

impl fmt::Display for ExecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Execute => "execute",
            Self::Load => "load",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        };
        write!(f, "{label}")
    }
}

///
/// MetricsEvent
///

#[derive(Clone, Debug)]
pub struct MetricsEvent {
    pub kind: ExecKind,
    pub model: Option<String>,
    pub rows: u64,
}

impl MetricsEvent {
    #[must_use]
    pub const fn new(kind: ExecKind) -> Self {
        Self {
            kind,
            model: None,
            rows: 0,
        }
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn rows(mut self, rows: u64) -> Self {
        self.rows = rows;
        self
    }
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricsEvent);
}

thread_local! {
    static SINK: Cell<Option<&'static dyn MetricsSink>> = const { Cell::new(None) };
}

/// Run `f` with a sink installed for the current thread. The previous
/// sink (if any) is restored afterwards, even on unwind.
pub fn with_metrics_sink<T>(sink: &'static dyn MetricsSink, f: impl FnOnce() -> T) -> T {
    struct Restore(Option<&'static dyn MetricsSink>);
    impl Drop for Restore {
        fn drop(&mut self) {
            SINK.with(|cell| cell.set(self.0));
        }
    }

    let previous = SINK.with(|cell| cell.replace(Some(sink)));
    let _restore = Restore(previous);
    f()
}

/// Report one event to the installed sink, if any.
pub(crate) fn record(event: &MetricsEvent) {
    SINK.with(|cell| {
        if let Some(sink) = cell.get() {
            sink.record(event);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static EVENTS: Mutex<Vec<ExecKind>> = Mutex::new(Vec::new());

    struct TestSink;
    impl MetricsSink for TestSink {
        fn record(&self, event: &MetricsEvent) {
            EVENTS.lock().unwrap().push(event.kind);
        }
    }

    static SINK_IMPL: TestSink = TestSink;

    #[test]
    fn events_reach_the_installed_sink_only_inside_the_scope() {
        record(&MetricsEvent::new(ExecKind::Load));
        assert!(EVENTS.lock().unwrap().is_empty());

        with_metrics_sink(&SINK_IMPL, || {
            record(&MetricsEvent::new(ExecKind::Commit));
        });

        record(&MetricsEvent::new(ExecKind::Rollback));

        let events = EVENTS.lock().unwrap();
        assert_eq!(events.as_slice(), &[ExecKind::Commit]);
    }
}
