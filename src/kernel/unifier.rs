use std::fmt;

use tracing::trace;

use crate::kernel::substitution::Substitution;
use crate::kernel::term::{FreeVar, Term};

/// The ways unification can fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnificationError {
    /// The two terms disagree structurally at some position.
    Mismatch(Term, Term),

    /// A variable would have to contain itself.
    Occurs(FreeVar, Term),

    /// Two applications have a different number of arguments.
    ArityMismatch(Term, Term),
}

impl fmt::Display for UnificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnificationError::Mismatch(a, b) => {
                write!(f, "cannot match {} against {}", a, b)
            }
            UnificationError::Occurs(v, t) => {
                write!(f, "variable {} occurs in {}", v, t)
            }
            UnificationError::ArityMismatch(a, b) => {
                write!(f, "argument counts differ between {} and {}", a, b)
            }
        }
    }
}

/// First-order unification over the term signature, up to consistent
/// renaming of bound variables.
///
/// Two bound references at the same depth are equal regardless of the
/// display names on their binders, which de Bruijn indices give for free.
/// Free variables are allowed to bind to terms containing bound references;
/// the adaptation algorithm depends on this, and manages the resulting
/// dangling indices explicitly.
pub fn unify_allowing_bound_renaming(
    t1: &Term,
    t2: &Term,
) -> Result<Substitution, UnificationError> {
    trace!("unifying {} with {}", t1, t2);
    let mut sub = Substitution::new();
    unify_into(t1, t2, &mut sub)?;
    Ok(sub)
}

fn unify_into(t1: &Term, t2: &Term, sub: &mut Substitution) -> Result<(), UnificationError> {
    // Work on the current images so earlier bindings take effect.
    let t1 = t1.substitute(sub);
    let t2 = t2.substitute(sub);
    match (&t1, &t2) {
        (Term::Free(a), Term::Free(b)) if a.key() == b.key() => Ok(()),
        (Term::Free(a), _) => bind(a, &t2, sub),
        (_, Term::Free(b)) => bind(b, &t1, sub),
        (Term::Constant(a), Term::Constant(b)) => {
            if a.name == b.name {
                Ok(())
            } else {
                Err(UnificationError::Mismatch(t1.clone(), t2.clone()))
            }
        }
        (Term::Bound(a), Term::Bound(b)) => {
            if a.index == b.index {
                Ok(())
            } else {
                Err(UnificationError::Mismatch(t1.clone(), t2.clone()))
            }
        }
        (Term::Application(a), Term::Application(b)) => {
            if a.args.len() != b.args.len() {
                return Err(UnificationError::ArityMismatch(t1.clone(), t2.clone()));
            }
            unify_into(&a.head, &b.head, sub)?;
            for (x, y) in a.args.iter().zip(&b.args) {
                unify_into(x, y, sub)?;
            }
            Ok(())
        }
        (Term::Abstraction(a), Term::Abstraction(b)) => {
            unify_into(&a.var_ty, &b.var_ty, sub)?;
            unify_into(&a.body, &b.body, sub)
        }
        _ => Err(UnificationError::Mismatch(t1.clone(), t2.clone())),
    }
}

fn bind(var: &FreeVar, term: &Term, sub: &mut Substitution) -> Result<(), UnificationError> {
    if term.has_free(&var.key()) {
        return Err(UnificationError::Occurs(var.clone(), term.clone()));
    }
    sub.add(var, term.clone());
    Ok(())
}
