use log::debug;
use std::sync::Arc;

/// Single-slot cache: recomputes only when the dependency key changes.
#[derive(Debug)]
pub struct Memo<K, V> {
    label: &'static str,
    entry: Option<(K, Arc<V>)>,
    computations: u64,
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entry: None,
            computations: 0,
        }
    }

    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        if let Some((k, v)) = &self.entry {
            if *k == key {
                return v.clone();
            }
        }
        debug!("recomputing {}", self.label);
        let v = Arc::new(compute());
        self.computations += 1;
        self.entry = Some((key, v.clone()));
        v
    }

    /// How many times the value has been (re)computed.
    pub fn computations(&self) -> u64 {
        self.computations
    }
}
