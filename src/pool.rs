//! Bounded buffer pools (§4.6): mutable string builders for attribute-value
//! normalisation and `ElementValidationContext` records for the content-model
//! validator, both capped at a small fixed size so a deeply-nested document
//! doesn't grow either pool without bound.

use crate::content_model::ValidationContext;

const POOL_CAPACITY: usize = 6;
const BUILDER_EVICTION_THRESHOLD: usize = 8 * 1024;

/// A bounded pool of reusable `String` builders, used for attribute-value
/// normalisation and entity replacement-text assembly.
pub struct StringBuilderPool {
    free: Vec<String>,
}

impl StringBuilderPool {
    pub fn new() -> Self {
        Self { free: Vec::with_capacity(POOL_CAPACITY) }
    }

    pub fn acquire(&mut self) -> String {
        self.free.pop().unwrap_or_default()
    }

    /// Returns a builder to the pool, unless it's grown past the eviction
    /// threshold or the pool is already at capacity, in which case it is
    /// simply dropped.
    pub fn release(&mut self, mut s: String) {
        if self.free.len() >= POOL_CAPACITY || s.capacity() > BUILDER_EVICTION_THRESHOLD {
            return;
        }
        s.clear();
        self.free.push(s);
    }
}

impl Default for StringBuilderPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A bounded pool of [`ElementValidationContext`] records.
pub struct ElementContextPool {
    free: Vec<ElementValidationContext>,
}

/// Per-element validation state, pushed on `startElement` and popped on
/// `endElement` (§3 "ElementValidationContext").
#[derive(Debug, Default)]
pub struct ElementValidationContext {
    pub element_name: Option<String>,
    pub validator: Option<ValidationContext>,
    pub entity_expansion_depth: usize,
}

impl ElementValidationContext {
    fn reset(&mut self, element_name: String, validator: Option<ValidationContext>, depth: usize) {
        self.element_name = Some(element_name);
        self.validator = validator;
        self.entity_expansion_depth = depth;
    }
}

impl ElementContextPool {
    pub fn new() -> Self {
        Self { free: Vec::with_capacity(POOL_CAPACITY) }
    }

    pub fn acquire(
        &mut self,
        element_name: String,
        validator: Option<ValidationContext>,
        entity_expansion_depth: usize,
    ) -> ElementValidationContext {
        match self.free.pop() {
            Some(mut ctx) => {
                ctx.reset(element_name, validator, entity_expansion_depth);
                ctx
            }
            None => ElementValidationContext {
                element_name: Some(element_name),
                validator,
                entity_expansion_depth,
            },
        }
    }

    pub fn release(&mut self, mut ctx: ElementValidationContext) {
        if self.free.len() >= POOL_CAPACITY {
            return;
        }
        ctx.element_name = None;
        ctx.validator = None;
        self.free.push(ctx);
    }
}

impl Default for ElementContextPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_builders_are_not_retained() {
        let mut pool = StringBuilderPool::new();
        let big = String::with_capacity(BUILDER_EVICTION_THRESHOLD + 1);
        pool.release(big);
        assert_eq!(pool.free.len(), 0);
    }

    #[test]
    fn pool_caps_at_capacity() {
        let mut pool = StringBuilderPool::new();
        for _ in 0..POOL_CAPACITY + 2 {
            pool.release(String::new());
        }
        assert_eq!(pool.free.len(), POOL_CAPACITY);
    }
}
