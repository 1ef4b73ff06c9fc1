use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::kernel::substitution::Substitution;
use crate::kernel::var_supply::VarSupply;

/// The identity of a free metavariable: its display name plus the stamp that
/// distinguishes freshened copies. Stamp 0 is reserved for variables that
/// came directly from source text.
pub type VarKey = (String, u32);

/// A free metavariable. Identity is (name, stamp); the type is carried along
/// for display and for building binder types, and is treated as opaque by
/// substitution.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FreeVar {
    pub name: String,
    pub stamp: u32,
    pub ty: Box<Term>,
}

impl FreeVar {
    pub fn key(&self) -> VarKey {
        (self.name.clone(), self.stamp)
    }
}

impl fmt::Display for FreeVar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.stamp == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}_{}", self.name, self.stamp)
        }
    }
}

/// A declared constant: a grammar constructor head or a syntactic category.
/// `ty` is None only for the distinguished base sort.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub ty: Option<Box<Term>>,
}

/// A de Bruijn reference to an enclosing abstraction.
/// Index 0 is the innermost binder.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BoundVar {
    pub index: usize,
}

/// An application of a head term to one or more arguments, kept uncurried
/// the way clause elaboration produces it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Application {
    pub head: Box<Term>,
    pub args: Vec<Term>,
}

/// A variable-binding abstraction. The name is a display hint only;
/// equality of bound references goes through de Bruijn indices.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Abstraction {
    pub name: String,
    pub var_ty: Box<Term>,
    pub body: Box<Term>,
}

/// The term representation. A closed union: every operation in the kernel
/// and the elaborator dispatches exhaustively over exactly these variants.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Term {
    Constant(Constant),
    Free(FreeVar),
    Bound(BoundVar),
    Application(Application),
    Abstraction(Abstraction),
}

impl Term {
    pub fn constant(name: &str, ty: Term) -> Term {
        Term::Constant(Constant {
            name: name.to_string(),
            ty: Some(Box::new(ty)),
        })
    }

    /// The base sort: the type of syntactic categories and judgment forms.
    pub fn type_sort() -> Term {
        Term::Constant(Constant {
            name: "Type".to_string(),
            ty: None,
        })
    }

    /// The placeholder type used for synthesized variables whose type cannot
    /// be known locally, like the fresh assumption-tail placeholder.
    pub fn unknown_type() -> Term {
        Term::constant("?", Term::type_sort())
    }

    pub fn free(var: FreeVar) -> Term {
        Term::Free(var)
    }

    /// A source-level free variable (stamp 0).
    pub fn free_named(name: &str, ty: Term) -> Term {
        Term::Free(FreeVar {
            name: name.to_string(),
            stamp: 0,
            ty: Box::new(ty),
        })
    }

    pub fn bound(index: usize) -> Term {
        Term::Bound(BoundVar { index })
    }

    /// Build an application, or just the head if there are no arguments.
    pub fn application(head: Term, args: Vec<Term>) -> Term {
        if args.is_empty() {
            return head;
        }
        Term::Application(Application {
            head: Box::new(head),
            args,
        })
    }

    pub fn abstraction(name: &str, var_ty: Term, body: Term) -> Term {
        Term::Abstraction(Abstraction {
            name: name.to_string(),
            var_ty: Box::new(var_ty),
            body: Box::new(body),
        })
    }

    /// Count the abstractions wrapped around the outside of this term.
    pub fn count_outer_abstractions(&self) -> usize {
        let mut count = 0;
        let mut current = self;
        while let Term::Abstraction(abs) = current {
            count += 1;
            current = &abs.body;
        }
        count
    }

    /// Collect the free variables of this term, in a deterministic order.
    /// Variable types are opaque: free variables inside a type annotation do
    /// not count as occurrences.
    pub fn free_variables(&self) -> BTreeSet<FreeVar> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut out);
        out
    }

    fn collect_free(&self, out: &mut BTreeSet<FreeVar>) {
        match self {
            Term::Constant(_) | Term::Bound(_) => {}
            Term::Free(v) => {
                out.insert(v.clone());
            }
            Term::Application(app) => {
                app.head.collect_free(out);
                for arg in &app.args {
                    arg.collect_free(out);
                }
            }
            Term::Abstraction(abs) => {
                abs.var_ty.collect_free(out);
                abs.body.collect_free(out);
            }
        }
    }

    /// True if the given variable occurs free in this term.
    pub fn has_free(&self, key: &VarKey) -> bool {
        match self {
            Term::Constant(_) | Term::Bound(_) => false,
            Term::Free(v) => v.name == key.0 && v.stamp == key.1,
            Term::Application(app) => {
                app.head.has_free(key) || app.args.iter().any(|a| a.has_free(key))
            }
            Term::Abstraction(abs) => abs.var_ty.has_free(key) || abs.body.has_free(key),
        }
    }

    /// Apply a substitution to this term.
    ///
    /// Replacement terms are spliced in as-is: they are expected to be
    /// expressed relative to the context in which the replaced variable
    /// occurs. Bound references in the surrounding term are untouched, so a
    /// variable that was free in a replacement can never be captured by the
    /// term's own binders; dangling indices inside replacements are managed
    /// explicitly by the caller with `shift` and `Substitution::shifted`.
    pub fn substitute(&self, sub: &Substitution) -> Term {
        match self {
            Term::Constant(_) | Term::Bound(_) => self.clone(),
            Term::Free(v) => match sub.get(&v.key()) {
                Some(t) => t.clone(),
                None => self.clone(),
            },
            Term::Application(app) => {
                let head = app.head.substitute(sub);
                let args: Vec<Term> = app.args.iter().map(|a| a.substitute(sub)).collect();
                // The head may itself have been replaced by an application;
                // flattening keeps the uncurried form canonical.
                match head {
                    Term::Application(mut inner) => {
                        inner.args.extend(args);
                        Term::Application(inner)
                    }
                    head => Term::application(head, args),
                }
            }
            Term::Abstraction(abs) => Term::abstraction(
                &abs.name,
                abs.var_ty.substitute(sub),
                abs.body.substitute(sub),
            ),
        }
    }

    /// Shift every dangling de Bruijn index by `delta`. Indices bound by
    /// abstractions inside the term are left alone.
    ///
    /// Panics if a negative shift would push a dangling index below its
    /// cutoff; such a term would be malformed.
    pub fn shift(&self, delta: i64) -> Term {
        self.shift_from(0, delta)
    }

    fn shift_from(&self, cutoff: usize, delta: i64) -> Term {
        match self {
            Term::Constant(_) | Term::Free(_) => self.clone(),
            Term::Bound(b) => {
                if b.index < cutoff {
                    self.clone()
                } else {
                    let shifted = b.index as i64 + delta;
                    if shifted < cutoff as i64 {
                        panic!(
                            "shift by {} would capture dangling index {} at cutoff {}",
                            delta, b.index, cutoff
                        );
                    }
                    Term::bound(shifted as usize)
                }
            }
            Term::Application(app) => {
                let head = app.head.shift_from(cutoff, delta);
                let args = app.args.iter().map(|a| a.shift_from(cutoff, delta)).collect();
                Term::application(head, args)
            }
            Term::Abstraction(abs) => Term::abstraction(
                &abs.name,
                abs.var_ty.shift_from(cutoff, delta),
                abs.body.shift_from(cutoff + 1, delta),
            ),
        }
    }

    /// Record, in `sub`, the rewrite of the designated free variables into
    /// bound references. `targets` is ordered outermost-binder-first, and
    /// `depth` is the number of binders between the rewrite point and the
    /// innermost of the new binders: target j maps to index
    /// `depth + (targets.len() - 1 - j)`.
    ///
    /// Only variables that actually occur free in this term are recorded.
    /// The caller applies the substitution.
    pub fn bind_free_as_bound(&self, targets: &[FreeVar], sub: &mut Substitution, depth: usize) {
        let n = targets.len();
        let pairs: Vec<(FreeVar, usize)> = targets
            .iter()
            .enumerate()
            .map(|(j, v)| (v.clone(), depth + (n - 1 - j)))
            .collect();
        self.bind_each_at(&pairs, sub);
    }

    /// Like `bind_free_as_bound`, but with an explicit index per target.
    /// Used when the new binders are interleaved with other entries.
    pub fn bind_each_at(&self, targets: &[(FreeVar, usize)], sub: &mut Substitution) {
        for (var, index) in targets {
            if self.has_free(&var.key()) {
                sub.insert(var.key(), Term::bound(*index));
            }
        }
    }

    /// Extend `sub` so that every free variable of this term not already in
    /// its domain maps to a fresh variable with the same name and type.
    pub fn freshen_into(&self, supply: &mut VarSupply, sub: &mut Substitution) {
        for var in self.free_variables() {
            if sub.get(&var.key()).is_none() {
                let fresh = supply.fresh(&var.name, (*var.ty).clone());
                sub.insert(var.key(), Term::Free(fresh));
            }
        }
    }

    /// Structural equality that ignores abstraction display names and
    /// variable type annotations: terms that differ only by a consistent
    /// renaming of bound variables compare equal.
    pub fn alpha_eq(&self, other: &Term) -> bool {
        match (self, other) {
            (Term::Constant(a), Term::Constant(b)) => a.name == b.name,
            (Term::Free(a), Term::Free(b)) => a.name == b.name && a.stamp == b.stamp,
            (Term::Bound(a), Term::Bound(b)) => a.index == b.index,
            (Term::Application(a), Term::Application(b)) => {
                a.args.len() == b.args.len()
                    && a.head.alpha_eq(&b.head)
                    && a.args.iter().zip(&b.args).all(|(x, y)| x.alpha_eq(y))
            }
            (Term::Abstraction(a), Term::Abstraction(b)) => {
                a.var_ty.alpha_eq(&b.var_ty) && a.body.alpha_eq(&b.body)
            }
            _ => false,
        }
    }

    /// True if every de Bruijn index is consistent with the number of
    /// enclosing abstractions plus the given ambient depth.
    pub fn well_scoped(&self, depth: usize) -> bool {
        match self {
            Term::Constant(_) | Term::Free(_) => true,
            Term::Bound(b) => b.index < depth,
            Term::Application(app) => {
                app.head.well_scoped(depth) && app.args.iter().all(|a| a.well_scoped(depth))
            }
            Term::Abstraction(abs) => {
                abs.var_ty.well_scoped(depth) && abs.body.well_scoped(depth + 1)
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Constant(c) => write!(f, "{}", c.name),
            Term::Free(v) => write!(f, "{}", v),
            Term::Bound(b) => write!(f, "%{}", b.index),
            Term::Application(app) => {
                write!(f, "{}(", app.head)?;
                for (i, arg) in app.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Term::Abstraction(abs) => {
                write!(f, "\\{}:{}. {}", abs.name, abs.var_ty, abs.body)
            }
        }
    }
}
