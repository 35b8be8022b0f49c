//! Argument matching.
//!
//! Matching works on argument *names* only, never on values, so its result
//! can be computed once per call shape and reused by every later call with
//! the same shape. [`MatchedArguments::bind`] then places a call's values.

#![expect(
    clippy::disallowed_types,
    reason = "Arc is the implementation of SharedMatcher"
)]


use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use ori_frame::errors::{duplicate_argument, too_many_arguments, unused_argument, zero_length_name};
use ori_frame::{
    Callable, EvalError, Formal, Name, SharedInterner, Value, VariadicEntry, VariadicGroup,
};

/// Description of the call expression, for diagnostics and traces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSourceInfo {
    label: Box<str>,
}

impl CallSourceInfo {
    pub fn new(label: &str) -> Self {
        CallSourceInfo {
            label: label.into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for CallSourceInfo {
    fn default() -> Self {
        CallSourceInfo::new("<call>")
    }
}

/// Where a formal's value comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormalSource {
    /// The supplied argument at this index.
    Supplied(usize),
    /// The supplied arguments at these indices, collected into a group.
    Collected(SmallVec<[usize; 4]>),
    /// The formal's default value.
    Default,
    /// Nothing; reading the formal is an error.
    Missing,
}

/// Result of matching supplied argument names against formals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedArguments {
    sources: Box<[FormalSource]>,
    allows_reorder: bool,
}

impl MatchedArguments {
    pub fn new(sources: Vec<FormalSource>, allows_reorder: bool) -> Self {
        MatchedArguments {
            sources: sources.into_boxed_slice(),
            allows_reorder,
        }
    }

    /// One entry per formal, in formal order.
    pub fn sources(&self) -> &[FormalSource] {
        &self.sources
    }

    /// Whether the matcher was free to reorder argument evaluation.
    pub fn allows_reorder(&self) -> bool {
        self.allows_reorder
    }

    /// Place one call's values: one entry per formal of `callable`.
    pub fn bind(
        &self,
        callable: &Callable,
        names: &[Option<Name>],
        values: &[Value],
    ) -> SmallVec<[Option<Value>; 4]> {
        callable
            .formals()
            .iter()
            .zip(self.sources.iter())
            .map(|(formal, source)| bind_formal(formal, source, names, values))
            .collect()
    }
}

fn bind_formal(
    formal: &Formal,
    source: &FormalSource,
    names: &[Option<Name>],
    values: &[Value],
) -> Option<Value> {
    match source {
        FormalSource::Supplied(index) => values.get(*index).cloned(),
        FormalSource::Collected(indices) => {
            let entries = indices
                .iter()
                .filter_map(|&index| {
                    Some(VariadicEntry {
                        name: names.get(index).copied().flatten(),
                        value: values.get(index)?.clone(),
                    })
                })
                .collect();
            Some(Value::Variadic(VariadicGroup::new(entries)))
        }
        FormalSource::Default => formal.default.clone(),
        FormalSource::Missing => None,
    }
}

/// Binds supplied arguments to formal parameters.
pub trait ArgumentMatcher: Send + Sync {
    /// Match `supplied` (argument names in call order) against
    /// `callable`'s formals.
    ///
    /// Must reject an empty-string name, and must fail when names or arity
    /// cannot be reconciled with the formals.
    fn match_arguments(
        &self,
        callable: &Callable,
        supplied: &[Option<Name>],
        source: &CallSourceInfo,
        allow_reorder: bool,
    ) -> Result<MatchedArguments, EvalError>;
}

/// Shared handle to an [`ArgumentMatcher`].
#[derive(Clone)]
pub struct SharedMatcher(Arc<dyn ArgumentMatcher>);

impl SharedMatcher {
    pub fn new(matcher: impl ArgumentMatcher + 'static) -> Self {
        SharedMatcher(Arc::new(matcher))
    }
}

impl std::ops::Deref for SharedMatcher {
    type Target = dyn ArgumentMatcher;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// The standard matching rules.
///
/// 1. Named arguments bind to the formal of exactly that name.
/// 2. Positional arguments fill the remaining formals before `...`, in order.
/// 3. Whatever is left goes to `...`; without one, leftovers are an error.
/// 4. Unfilled formals take their default, or stay missing.
pub struct FormalMatcher {
    interner: SharedInterner,
}

impl FormalMatcher {
    pub fn new(interner: SharedInterner) -> Self {
        FormalMatcher { interner }
    }
}

impl ArgumentMatcher for FormalMatcher {
    fn match_arguments(
        &self,
        callable: &Callable,
        supplied: &[Option<Name>],
        source: &CallSourceInfo,
        allow_reorder: bool,
    ) -> Result<MatchedArguments, EvalError> {
        if supplied.iter().any(|name| *name == Some(Name::EMPTY)) {
            return Err(zero_length_name());
        }

        let formals = callable.formals();
        let mut sources: Vec<Option<FormalSource>> = vec![None; formals.len()];
        let mut used = vec![false; supplied.len()];
        let variadic = formals.iter().position(Formal::is_variadic);
        let by_name: FxHashMap<Name, usize> = formals
            .iter()
            .enumerate()
            .filter(|(_, formal)| !formal.is_variadic())
            .map(|(index, formal)| (formal.name, index))
            .collect();

        for (index, name) in supplied.iter().enumerate() {
            let Some(name) = *name else { continue };
            let Some(&formal) = by_name.get(&name) else {
                continue;
            };
            if sources[formal].is_some() {
                return Err(duplicate_argument(self.interner.lookup(name)));
            }
            sources[formal] = Some(FormalSource::Supplied(index));
            used[index] = true;
        }

        let positional_end = variadic.unwrap_or(formals.len());
        let mut next = 0;
        for (index, name) in supplied.iter().enumerate() {
            if used[index] || name.is_some() {
                continue;
            }
            while next < positional_end && sources[next].is_some() {
                next += 1;
            }
            if next == positional_end {
                break;
            }
            sources[next] = Some(FormalSource::Supplied(index));
            used[index] = true;
            next += 1;
        }

        let leftovers: SmallVec<[usize; 4]> = (0..supplied.len()).filter(|&i| !used[i]).collect();
        match variadic {
            Some(variadic) => sources[variadic] = Some(FormalSource::Collected(leftovers)),
            None => {
                if let Some(&first) = leftovers.first() {
                    tracing::trace!(
                        call = source.label(),
                        callee = callable.label(),
                        "arguments do not match"
                    );
                    return Err(match supplied[first] {
                        Some(name) => unused_argument(self.interner.lookup(name)),
                        None => too_many_arguments(callable.label(), formals.len(), supplied.len()),
                    });
                }
            }
        }

        let sources = sources
            .into_iter()
            .zip(formals)
            .map(|(source, formal)| {
                source.unwrap_or(if formal.default.is_some() {
                    FormalSource::Default
                } else {
                    FormalSource::Missing
                })
            })
            .collect();
        Ok(MatchedArguments::new(sources, allow_reorder))
    }
}
