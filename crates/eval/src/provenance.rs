//! Read tracking for check and mutation provenance.
//!
//! Static analysis lists every path an expression *could* read; the
//! collector records the ones an evaluation actually read (a Match only
//! evaluates the arm it selects).

use crate::types::PathString;

#[derive(Debug, Clone, Default)]
pub struct ProvenanceCollector {
    pub paths_used: Vec<PathString>,
}

impl ProvenanceCollector {
    pub fn new() -> Self {
        ProvenanceCollector {
            paths_used: Vec::new(),
        }
    }

    /// Record a path read. Duplicates are ignored.
    pub fn record_path(&mut self, path: &PathString) {
        if !self.paths_used.contains(path) {
            self.paths_used.push(path.clone());
        }
    }

    pub fn into_paths(self) -> Vec<PathString> {
        self.paths_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_records_in_order_without_duplicates() {
        let mut c = ProvenanceCollector::new();
        let a = PathString::parse("_curr.qty").unwrap();
        let b = PathString::parse("_prev.qty").unwrap();
        c.record_path(&a);
        c.record_path(&b);
        c.record_path(&a);
        assert_eq!(c.into_paths(), vec![a, b]);
    }
}
