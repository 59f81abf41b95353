/// Synchronous observer list.
///
/// Subscribers run on the caller's thread while the controller holds its
/// write context; they must not call back into any mutating controller
/// operation.
pub struct Signal<T> {
    slots: Vec<Box<dyn Fn(&T) + Send + Sync>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal { slots: Vec::new() }
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, slot: impl Fn(&T) + Send + Sync + 'static) {
        self.slots.push(Box::new(slot));
    }

    pub(crate) fn emit(&self, payload: &T) {
        for slot in self.slots.iter() {
            slot(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_all_slots_run_in_order() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut signal: Signal<u32> = Signal::new();
        for _ in 0..3 {
            let counter = counter.clone();
            signal.connect(move |value| {
                counter.fetch_add(*value, Ordering::SeqCst);
            });
        }
        signal.emit(&7);
        assert_eq!(counter.load(Ordering::SeqCst), 21);
    }
}
