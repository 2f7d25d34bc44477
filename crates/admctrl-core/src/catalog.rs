//! Function catalog built from a decoded function list.
//!
//! Ownership is a plain tree: `Catalog` owns its `FunctionType`s, each owns its
//! `LibraryImplementation`s, each owns its `FunctionInstance`s in arrival order.
//! Function types and libraries keep first-seen order so fact emission is
//! deterministic.
//!
//! Every instance of one function must carry the same number of arguments and
//! each parameter slot must keep one bound kind (integers and string lengths
//! share a kind). Violations reject the whole list.

use std::collections::HashMap;

use crate::error::DecodeError;

/// One decoded argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgument {
    /// `i`
    Int32(i32),
    /// `d`
    Double(f64),
    /// `L`
    UInt64(u64),
    /// `s`
    Str(String),
    /// `F`: carries the name of the nested function record.
    Function(String),
}

impl FunctionArgument {
    /// Type character used in the serialized type string.
    pub fn type_char(&self) -> char {
        match self {
            FunctionArgument::Int32(_) => 'i',
            FunctionArgument::Double(_) => 'd',
            FunctionArgument::UInt64(_) => 'L',
            FunctionArgument::Str(_) => 's',
            FunctionArgument::Function(_) => 'F',
        }
    }

    /// Value as rendered into an evaluator fact.
    pub fn render(&self) -> String {
        match self {
            FunctionArgument::Int32(v) => v.to_string(),
            FunctionArgument::Double(v) => format!("{v:.6}"),
            FunctionArgument::UInt64(v) => v.to_string(),
            FunctionArgument::Str(s) => s.clone(),
            FunctionArgument::Function(name) => name.clone(),
        }
    }
}

/// Running min/max of one parameter slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgBounds {
    /// `i32` values and string byte lengths.
    Int { min: i64, max: i64 },
    Double { min: f64, max: f64 },
    UInt { min: u64, max: u64 },
    /// Nested functions carry no bounds.
    Unbounded,
}

impl ArgBounds {
    fn seed(arg: &FunctionArgument) -> Self {
        match arg {
            FunctionArgument::Int32(v) => ArgBounds::Int {
                min: i64::from(*v),
                max: i64::from(*v),
            },
            FunctionArgument::Str(s) => {
                let len = str_len(s);
                ArgBounds::Int { min: len, max: len }
            }
            FunctionArgument::Double(v) => ArgBounds::Double { min: *v, max: *v },
            FunctionArgument::UInt64(v) => ArgBounds::UInt { min: *v, max: *v },
            FunctionArgument::Function(_) => ArgBounds::Unbounded,
        }
    }

    fn accepts(&self, arg: &FunctionArgument) -> bool {
        matches!(
            (self, arg),
            (ArgBounds::Int { .. }, FunctionArgument::Int32(_))
                | (ArgBounds::Int { .. }, FunctionArgument::Str(_))
                | (ArgBounds::Double { .. }, FunctionArgument::Double(_))
                | (ArgBounds::UInt { .. }, FunctionArgument::UInt64(_))
                | (ArgBounds::Unbounded, FunctionArgument::Function(_))
        )
    }

    /// Caller must have checked `accepts`.
    fn widen(&mut self, arg: &FunctionArgument) {
        match (self, arg) {
            (ArgBounds::Int { min, max }, FunctionArgument::Int32(v)) => {
                let v = i64::from(*v);
                *min = (*min).min(v);
                *max = (*max).max(v);
            }
            (ArgBounds::Int { min, max }, FunctionArgument::Str(s)) => {
                let v = str_len(s);
                *min = (*min).min(v);
                *max = (*max).max(v);
            }
            (ArgBounds::Double { min, max }, FunctionArgument::Double(v)) => {
                *min = min.min(*v);
                *max = max.max(*v);
            }
            (ArgBounds::UInt { min, max }, FunctionArgument::UInt64(v)) => {
                *min = (*min).min(*v);
                *max = (*max).max(*v);
            }
            _ => {}
        }
    }

    /// Rendered `(min, max)`, `None` for nested-function slots.
    pub fn render(&self) -> Option<(String, String)> {
        match self {
            ArgBounds::Int { min, max } => Some((min.to_string(), max.to_string())),
            ArgBounds::Double { min, max } => Some((format!("{min:.6}"), format!("{max:.6}"))),
            ArgBounds::UInt { min, max } => Some((min.to_string(), max.to_string())),
            ArgBounds::Unbounded => None,
        }
    }
}

fn str_len(s: &str) -> i64 {
    i64::try_from(s.len()).unwrap_or(i64::MAX)
}

fn widen_all(bounds: &mut [ArgBounds], args: &[FunctionArgument]) {
    for (b, a) in bounds.iter_mut().zip(args) {
        b.widen(a);
    }
}

/// A single call site in the request.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInstance {
    /// Index of the top-level record this instance came from.
    pub position: u32,
    pub args: Vec<FunctionArgument>,
}

/// All instances of one function implemented by one library.
#[derive(Debug, Clone)]
pub struct LibraryImplementation {
    pub name: String,
    pub first: u32,
    pub last: u32,
    pub bounds: Vec<ArgBounds>,
    pub instances: Vec<FunctionInstance>,
}

impl LibraryImplementation {
    pub fn num(&self) -> usize {
        self.instances.len()
    }
}

/// All instances of one function name, across libraries.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub name: String,
    pub arity: usize,
    pub num: usize,
    pub first: u32,
    pub last: u32,
    pub bounds: Vec<ArgBounds>,
    pub libraries: Vec<LibraryImplementation>,
}

impl FunctionType {
    /// Instances in emission order: library by library, arrival order inside each.
    pub fn instances(&self) -> impl Iterator<Item = (&LibraryImplementation, &FunctionInstance)> {
        self.libraries
            .iter()
            .flat_map(|lib| lib.instances.iter().map(move |inst| (lib, inst)))
    }
}

/// Catalog of every function instance named in a request.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    functions: Vec<FunctionType>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn functions(&self) -> &[FunctionType] {
        &self.functions
    }

    pub fn get(&self, name: &str) -> Option<&FunctionType> {
        self.by_name.get(name).and_then(|&i| self.functions.get(i))
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Total instances across all function types.
    pub fn instance_count(&self) -> usize {
        self.functions.iter().map(|f| f.num).sum()
    }

    /// Add one instance of `function` implemented by `library`.
    ///
    /// The catalog is left untouched when the instance is rejected.
    pub fn insert(
        &mut self,
        function: &str,
        library: &str,
        instance: FunctionInstance,
    ) -> Result<(), DecodeError> {
        let pos = instance.position;

        let existing = self
            .by_name
            .get(function)
            .copied()
            .and_then(|i| self.functions.get_mut(i));

        let Some(ft) = existing else {
            let bounds: Vec<ArgBounds> = instance.args.iter().map(ArgBounds::seed).collect();
            self.by_name.insert(function.to_string(), self.functions.len());
            self.functions.push(FunctionType {
                name: function.to_string(),
                arity: instance.args.len(),
                num: 1,
                first: pos,
                last: pos,
                bounds: bounds.clone(),
                libraries: vec![LibraryImplementation {
                    name: library.to_string(),
                    first: pos,
                    last: pos,
                    bounds,
                    instances: vec![instance],
                }],
            });
            return Ok(());
        };

        if ft.arity != instance.args.len() {
            return Err(DecodeError::ArgumentCountMismatch {
                function: function.to_string(),
                expected: ft.arity,
                found: instance.args.len(),
            });
        }
        if let Some(index) = ft
            .bounds
            .iter()
            .zip(&instance.args)
            .position(|(b, a)| !b.accepts(a))
        {
            return Err(DecodeError::ArgumentTypeMismatch {
                function: function.to_string(),
                index,
            });
        }

        ft.num += 1;
        ft.first = ft.first.min(pos);
        ft.last = ft.last.max(pos);
        widen_all(&mut ft.bounds, &instance.args);

        match ft.libraries.iter_mut().find(|l| l.name == library) {
            Some(lib) => {
                lib.first = lib.first.min(pos);
                lib.last = lib.last.max(pos);
                widen_all(&mut lib.bounds, &instance.args);
                lib.instances.push(instance);
            }
            None => {
                let bounds = instance.args.iter().map(ArgBounds::seed).collect();
                ft.libraries.push(LibraryImplementation {
                    name: library.to_string(),
                    first: pos,
                    last: pos,
                    bounds,
                    instances: vec![instance],
                });
            }
        }
        Ok(())
    }
}
