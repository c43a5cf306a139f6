//! Decision hook (4.11). Intentionally infallible: a hook that cannot
//! return an error cannot propagate one across the trait boundary, so there
//! is nothing here to catch. Implementations that need to surface their own
//! failures must log them before returning.

use crate::events::payload::DecisionRecord;

pub trait DecisionHook: Send + Sync {
    fn decision(&self, record: &DecisionRecord);
}

pub struct NoopHook;

impl DecisionHook for NoopHook {
    fn decision(&self, _record: &DecisionRecord) {}
}
