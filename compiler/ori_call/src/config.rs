//! Call-site configuration.

/// How far a call site specializes before it stops growing.
///
/// `function_depth` bounds the number of distinct callables a site caches
/// (one chain link each); `variadic_depth` bounds the number of distinct
/// variadic shapes cached per callable. Past either bound the tail becomes a
/// generic node that re-matches arguments on every call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheLimits {
    pub function_depth: usize,
    pub variadic_depth: usize,
}

impl CacheLimits {
    #[must_use]
    pub fn with_function_depth(mut self, depth: usize) -> Self {
        self.function_depth = depth;
        self
    }

    #[must_use]
    pub fn with_variadic_depth(mut self, depth: usize) -> Self {
        self.variadic_depth = depth;
        self
    }
}

impl Default for CacheLimits {
    fn default() -> Self {
        CacheLimits {
            function_depth: 4,
            variadic_depth: 4,
        }
    }
}
