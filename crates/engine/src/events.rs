use serde::Serialize;
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    Started {
        configuration: String,
        total_lines: usize,
    },
    Progress {
        configuration: String,
        lines: usize,
    },
    Finished {
        configuration: String,
        directives: u64,
    },
}

pub trait RunSink: Send + Sync {
    fn event(&self, event: RunEvent);
}

static RUN_SINK: RwLock<Option<Box<dyn RunSink>>> = RwLock::new(None);

pub fn set_run_sink(sink: Option<Box<dyn RunSink>>) {
    *RUN_SINK.write().expect("run sink lock poisoned") = sink;
}

pub(crate) fn emit(event: RunEvent) {
    if let Some(s) = RUN_SINK.read().expect("run sink lock poisoned").as_ref() {
        s.event(event);
    }
}
