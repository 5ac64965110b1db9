//! Recovery after the kernel drops events (`SYN_DROPPED`).
//!
//! After an overrun everything up to and including the next `SYN_REPORT`
//! is unreliable and is discarded. Key state is then rebuilt from the
//! device's current key bitmap: keys released or pressed while events were
//! lost get synthetic release/press events, closed by a `SYN_REPORT`.

use std::collections::BTreeSet;

use tracing::debug;
use vdesk_types::codes::EV_KEY;
use vdesk_types::RawEvent;

use crate::error::InputError;

#[derive(Debug, Default)]
pub struct Resync {
    held: BTreeSet<u16>,
    dropping: bool,
}

impl Resync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether events are currently being discarded.
    pub fn is_dropping(&self) -> bool {
        self.dropping
    }

    /// Keys believed to be held down.
    pub fn held(&self) -> &BTreeSet<u16> {
        &self.held
    }

    /// Pass one event through, appending what should be delivered to `out`.
    ///
    /// `current_keys` is only called when a resync completes.
    pub fn process<F>(
        &mut self,
        event: RawEvent,
        out: &mut Vec<RawEvent>,
        current_keys: F,
    ) -> Result<(), InputError>
    where
        F: FnOnce() -> std::io::Result<BTreeSet<u16>>,
    {
        if event.is_sync_dropped() {
            debug!("event buffer overrun, resynchronizing");
            self.dropping = true;
            // Downstream resets its own buffered state on this marker.
            out.push(event);
            return Ok(());
        }

        if self.dropping {
            if event.is_sync_report() {
                self.dropping = false;
                let now = current_keys().map_err(InputError::Read)?;
                for &code in self.held.difference(&now) {
                    out.push(RawEvent::key(code, 0));
                }
                for &code in now.difference(&self.held) {
                    out.push(RawEvent::key(code, 1));
                }
                out.push(RawEvent::sync());
                self.held = now;
            }
            return Ok(());
        }

        if event.event_type == EV_KEY {
            if event.value == 0 {
                self.held.remove(&event.code);
            } else {
                self.held.insert(event.code);
            }
        }
        out.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdesk_types::codes::{BTN_LEFT, BTN_RIGHT, REL_X};

    fn keys(codes: &[u16]) -> BTreeSet<u16> {
        codes.iter().copied().collect()
    }

    fn unused() -> std::io::Result<BTreeSet<u16>> {
        panic!("key state queried outside a resync")
    }

    #[test]
    fn passes_events_through_and_tracks_keys() {
        let mut resync = Resync::new();
        let mut out = Vec::new();
        for event in [
            RawEvent::key(BTN_LEFT, 1),
            RawEvent::relative(REL_X, 2),
            RawEvent::sync(),
        ] {
            resync.process(event, &mut out, unused).unwrap();
        }
        assert_eq!(out.len(), 3);
        assert_eq!(resync.held(), &keys(&[BTN_LEFT]));

        resync
            .process(RawEvent::key(BTN_LEFT, 0), &mut out, unused)
            .unwrap();
        assert!(resync.held().is_empty());
    }

    #[test]
    fn overrun_discards_until_report_then_reconciles_keys() {
        let mut resync = Resync::new();
        let mut out = Vec::new();
        resync
            .process(RawEvent::key(BTN_LEFT, 1), &mut out, unused)
            .unwrap();
        out.clear();

        resync.process(RawEvent::dropped(), &mut out, unused).unwrap();
        assert!(resync.is_dropping());
        resync
            .process(RawEvent::relative(REL_X, 40), &mut out, unused)
            .unwrap();
        resync
            .process(RawEvent::sync(), &mut out, || Ok(keys(&[BTN_RIGHT])))
            .unwrap();

        assert!(!resync.is_dropping());
        assert_eq!(
            out,
            vec![
                RawEvent::dropped(),
                RawEvent::key(BTN_LEFT, 0),
                RawEvent::key(BTN_RIGHT, 1),
                RawEvent::sync(),
            ]
        );
        assert_eq!(resync.held(), &keys(&[BTN_RIGHT]));
    }

    #[test]
    fn failed_key_query_is_a_read_error() {
        let mut resync = Resync::new();
        let mut out = Vec::new();
        resync.process(RawEvent::dropped(), &mut out, unused).unwrap();
        let result = resync.process(RawEvent::sync(), &mut out, || {
            Err(std::io::Error::from(std::io::ErrorKind::NotFound))
        });
        assert!(matches!(result, Err(InputError::Read(_))));
    }
}
