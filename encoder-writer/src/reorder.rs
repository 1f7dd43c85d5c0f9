use std::collections::BTreeMap;

use tracing::warn;

/// Reorder buffer keyed by sequence number.
///
/// Emits items in strictly increasing sequence order. Gaps are permitted by
/// the drop policy, reordering never: a late item older than the last emitted
/// sequence is discarded. A missing sequence is waited on until the window of
/// frames observed since it reaches `horizon`, then skipped. When the buffer
/// hits `capacity` the oldest held item is dropped to preserve progress.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next_expected: Option<u64>,
    buf: BTreeMap<u64, T>,
    capacity: usize,
    horizon: u64,
}

impl<T> ReorderBuffer<T> {
    pub fn new(capacity: usize, horizon: u64) -> Self {
        assert!(capacity > 0 && horizon > 0);
        Self {
            next_expected: None,
            buf: BTreeMap::new(),
            capacity,
            horizon,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Insert one item and return everything now ready, in order.
    pub fn push(&mut self, seq: u64, item: T) -> Vec<(u64, T)> {
        if let Some(next) = self.next_expected {
            if seq < next {
                warn!(seq, next, "dropping stale frame behind the write cursor");
                return Vec::new();
            }
        } else {
            // First item defines where the stream starts.
            self.next_expected = Some(seq);
        }

        self.buf.insert(seq, item);

        if self.buf.len() > self.capacity {
            // Oldest item is sacrificed so the queue keeps moving.
            let (&oldest, _) = self.buf.iter().next().expect("nonempty");
            self.buf.remove(&oldest);
            warn!(seq = oldest, "reorder buffer full, dropped oldest frame");
            let next = self.next_expected.expect("set above");
            if oldest >= next {
                self.next_expected = Some(oldest + 1);
            }
        }

        self.maybe_skip_gap();
        self.drain_ready()
    }

    /// Emit everything still held, in order. Used at end of stream.
    pub fn flush(&mut self) -> Vec<(u64, T)> {
        let out: Vec<(u64, T)> = std::mem::take(&mut self.buf).into_iter().collect();
        if let Some((seq, _)) = out.last() {
            self.next_expected = Some(seq + 1);
        }
        out
    }

    fn maybe_skip_gap(&mut self) {
        let next = match self.next_expected {
            Some(n) => n,
            None => return,
        };
        if self.buf.contains_key(&next) {
            return;
        }
        let newest = match self.buf.keys().next_back() {
            Some(&n) => n,
            None => return,
        };
        // The missing sequence has aged past the horizon of observed frames.
        if newest - next + 1 >= self.horizon {
            let lowest = *self.buf.keys().next().expect("nonempty");
            warn!(
                from = next,
                to = lowest,
                "sequence gap timed out, skipping forward"
            );
            self.next_expected = Some(lowest);
        }
    }

    fn drain_ready(&mut self) -> Vec<(u64, T)> {
        let mut out = Vec::new();
        while let Some(next) = self.next_expected {
            match self.buf.remove(&next) {
                Some(item) => {
                    out.push((next, item));
                    self.next_expected = Some(next + 1);
                }
                None => break,
            }
        }
        out
    }
}
