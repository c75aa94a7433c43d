//! The QName pool (§4.6): reusable `(uri, localName, qName)` records
//! returned to a free list once a handler call that borrowed them returns.
//!
//! Grounded on the teacher's `delegate!`-based `NamespacedParser` (which
//! wraps a base parser's attribute/name handling rather than reallocating
//! it per element, `reader/parser.rs`), generalized here into an explicit
//! free-list pool so the namespace-resolved triple handed to `startElement`/
//! `endElement` doesn't allocate a fresh record per element.

use std::rc::Rc;

/// A namespace-resolved name triple, as passed to `startElement`/`endElement`.
#[derive(Debug, Clone, Default)]
pub struct QName {
    pub uri: Option<Rc<str>>,
    pub local_name: Rc<str>,
    pub qname: Rc<str>,
}

impl QName {
    fn reset(&mut self, uri: Option<Rc<str>>, local_name: Rc<str>, qname: Rc<str>) {
        self.uri = uri;
        self.local_name = local_name;
        self.qname = qname;
    }
}

/// A free-list pool of [`QName`] records. Callers check one out with
/// [`QNamePool::acquire`], fill it in, use it for the duration of one
/// handler call, then return it with [`QNamePool::release`].
pub struct QNamePool {
    free: Vec<QName>,
}

impl QNamePool {
    pub fn new() -> Self {
        Self { free: Vec::new() }
    }

    pub fn acquire(&mut self, uri: Option<Rc<str>>, local_name: Rc<str>, qname: Rc<str>) -> QName {
        match self.free.pop() {
            Some(mut q) => {
                q.reset(uri, local_name, qname);
                q
            }
            None => QName { uri, local_name, qname },
        }
    }

    pub fn release(&mut self, q: QName) {
        self.free.push(q);
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

impl Default for QNamePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_records_are_reused() {
        let mut pool = QNamePool::new();
        let q = pool.acquire(None, Rc::from("a"), Rc::from("a"));
        pool.release(q);
        assert_eq!(pool.free_count(), 1);
        let _q2 = pool.acquire(Some(Rc::from("urn:x")), Rc::from("b"), Rc::from("p:b"));
        assert_eq!(pool.free_count(), 0);
    }
}
