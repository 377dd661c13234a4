//! Test logger recording what the current thread logs, key-values included.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Once;

use log::kv::Key;
use log::kv::Source;
use log::kv::Value;
use log::kv::VisitSource;
use log::Level;
use log::LevelFilter;
use log::Log;
use log::Metadata;
use log::Record;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Entry {
    pub level: Level,
    pub message: String,
    pub key_values: BTreeMap<String, String>,
}

impl Entry {
    pub(crate) fn value(&self, key: &str) -> Option<&str> {
        self.key_values.get(key).map(String::as_str)
    }
}

thread_local! {
    static ENTRIES: RefCell<Vec<Entry>> = const { RefCell::new(Vec::new()) };
}

struct CapturingLogger;

struct Collect<'a>(&'a mut BTreeMap<String, String>);

impl<'kvs> VisitSource<'kvs> for Collect<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), log::kv::Error> {
        self.0.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let mut key_values = BTreeMap::new();
        let _ = record.key_values().visit(&mut Collect(&mut key_values));
        let entry = Entry {
            level: record.level(),
            message: record.args().to_string(),
            key_values,
        };
        ENTRIES.with(|entries| entries.borrow_mut().push(entry));
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger;
static INIT: Once = Once::new();

/// Runs `f` and returns its result with the entries it logged on this thread.
pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<Entry>) {
    INIT.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
    });
    ENTRIES.with(|entries| entries.borrow_mut().clear());
    let result = f();
    (result, ENTRIES.with(|entries| entries.take()))
}
