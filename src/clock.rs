/// Time source shared by the scheduling and OTP engines
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::sync::RwLock;

/// Supplies "now" to code that derives state from the clock
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Current local wall-clock time (the single implicit timezone)
    fn local(&self) -> NaiveDateTime {
        self.now().with_timezone(&Local).naive_local()
    }
}

/// Production clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock; local time and UTC are the same wall-clock reading
#[derive(Debug)]
pub struct FixedClock {
    at: RwLock<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime) -> Self {
        Self { at: RwLock::new(at) }
    }

    pub fn set(&self, at: NaiveDateTime) {
        if let Ok(mut guard) = self.at.write() {
            *guard = at;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.at.write() {
            *guard += by;
        }
    }

    fn reading(&self) -> NaiveDateTime {
        match self.at.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.reading().and_utc()
    }

    fn local(&self) -> NaiveDateTime {
        self.reading()
    }
}
