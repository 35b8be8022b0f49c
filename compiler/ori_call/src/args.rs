//! Supplied arguments.
//!
//! A call's arguments are fixed at the call expression: each one is a
//! constant, a read of a name, or a forward of the caller's `...` group.
//! Forwarding makes the call's shape dynamic; the flattened names of one
//! execution form its [`VariadicSignature`].


use smallvec::SmallVec;

use ori_frame::errors::{variadic_out_of_context, zero_length_name};
use ori_frame::{
    lookup_dynamic, Activation, EvalError, LookupCache, Name, StringInterner, Value, VariadicGroup,
};

/// Names of the supplied arguments, in order; `None` for positional ones.
pub type SuppliedNames = SmallVec<[Option<Name>; 4]>;

/// How one argument's value is produced.
pub enum ArgExpr {
    Const(Value),
    Read(LookupCache),
    /// Splice in the caller's `...` group.
    Forward,
}

impl ArgExpr {
    pub fn constant(value: Value) -> Self {
        ArgExpr::Const(value)
    }

    pub fn read(name: Name) -> Self {
        ArgExpr::Read(LookupCache::new(name))
    }
}

/// One supplied argument.
pub struct ArgSpec {
    pub name: Option<Name>,
    pub expr: ArgExpr,
}

impl ArgSpec {
    pub fn positional(expr: ArgExpr) -> Self {
        ArgSpec { name: None, expr }
    }

    pub fn named(name: Name, expr: ArgExpr) -> Self {
        ArgSpec {
            name: Some(name),
            expr,
        }
    }

    pub fn forward() -> Self {
        ArgSpec {
            name: None,
            expr: ArgExpr::Forward,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self.expr, ArgExpr::Forward)
    }
}

/// The arguments of one call expression.
pub struct CallArguments {
    specs: Box<[ArgSpec]>,
    names: SuppliedNames,
    forwards_variadic: bool,
}

impl CallArguments {
    pub fn new(specs: Vec<ArgSpec>) -> Self {
        let names = specs
            .iter()
            .filter(|spec| !spec.is_forward())
            .map(|spec| spec.name)
            .collect();
        let forwards_variadic = specs.iter().any(ArgSpec::is_forward);
        CallArguments {
            specs: specs.into_boxed_slice(),
            names,
            forwards_variadic,
        }
    }

    pub fn specs(&self) -> &[ArgSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn forwards_variadic(&self) -> bool {
        self.forwards_variadic
    }

    /// Names of the arguments written at the call, forwards excluded.
    pub fn static_names(&self) -> &[Option<Name>] {
        &self.names
    }

    /// Reject an argument written with the empty string as its name.
    pub fn check_names(&self) -> Result<(), EvalError> {
        if self.names.iter().any(|name| *name == Some(Name::EMPTY)) {
            return Err(zero_length_name());
        }
        Ok(())
    }

    /// The caller's `...` group, once per forward.
    pub fn read_groups(
        &self,
        caller: &Activation,
    ) -> Result<SmallVec<[VariadicGroup; 1]>, EvalError> {
        let mut groups = SmallVec::new();
        if !self.forwards_variadic {
            return Ok(groups);
        }
        let group = match lookup_dynamic(caller, Name::VARIADIC) {
            Some(Value::Variadic(group)) => group,
            _ => return Err(variadic_out_of_context()),
        };
        for _ in self.specs.iter().filter(|spec| spec.is_forward()) {
            groups.push(group.clone());
        }
        Ok(groups)
    }

    /// Names of the arguments with every forwarded group spliced in.
    pub fn flattened_names(&self, groups: &[VariadicGroup]) -> SuppliedNames {
        let mut names = SuppliedNames::new();
        let mut groups = groups.iter();
        for spec in self.specs.iter() {
            if spec.is_forward() {
                if let Some(group) = groups.next() {
                    names.extend(group.names());
                }
            } else {
                names.push(spec.name);
            }
        }
        names
    }

    /// Values of the arguments, flattened the same way as
    /// [`flattened_names`](Self::flattened_names).
    pub fn evaluate(
        &self,
        caller: &Activation,
        groups: &[VariadicGroup],
        interner: &StringInterner,
    ) -> Result<SmallVec<[Value; 4]>, EvalError> {
        let mut values = SmallVec::with_capacity(self.specs.len());
        let mut groups = groups.iter();
        for spec in self.specs.iter() {
            match &spec.expr {
                ArgExpr::Const(value) => values.push(value.clone()),
                ArgExpr::Read(cache) => values.push(cache.read_or_error(caller, interner)?),
                ArgExpr::Forward => {
                    if let Some(group) = groups.next() {
                        values.extend(group.entries().iter().map(|entry| entry.value.clone()));
                    }
                }
            }
        }
        Ok(values)
    }
}

/// Flattened shape of one call forwarding a variadic group.
///
/// Compared structurally: two calls with the same sequence of argument
/// names (and absences) share a signature whatever their values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VariadicSignature(SuppliedNames);

impl VariadicSignature {
    pub fn new(names: SuppliedNames) -> Self {
        VariadicSignature(names)
    }

    pub fn names(&self) -> &[Option<Name>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
