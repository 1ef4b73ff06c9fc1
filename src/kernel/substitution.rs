use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::kernel::term::{FreeVar, Term, VarKey};

/// A finite mapping from free-variable identities to terms.
///
/// The map composes on insertion: adding v -> t first applies the existing
/// mapping to t, then rewrites v in every existing replacement, so applying
/// the substitution once is equivalent to applying the insertions in order.
///
/// Backed by a BTreeMap so iteration order, and therefore everything built
/// from it, is deterministic across runs.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Substitution {
    map: BTreeMap<VarKey, Term>,
}

impl Substitution {
    pub fn new() -> Substitution {
        Substitution {
            map: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn get(&self, key: &VarKey) -> Option<&Term> {
        self.map.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VarKey, &Term)> {
        self.map.iter()
    }

    /// Insert a raw mapping without composing. Used when the caller has
    /// already arranged the replacement, e.g. `bind_free_as_bound`.
    pub fn insert(&mut self, key: VarKey, term: Term) {
        self.map.insert(key, term);
    }

    /// Compose v -> t into this substitution.
    pub fn add(&mut self, var: &FreeVar, term: Term) {
        let term = term.substitute(self);
        let single = {
            let mut s = Substitution::new();
            s.insert(var.key(), term.clone());
            s
        };
        for existing in self.map.values_mut() {
            *existing = existing.substitute(&single);
        }
        self.map.insert(var.key(), term);
    }

    /// Keep the given variables out of this substitution's domain where
    /// possible, by inverting mappings whose replacement is itself a free
    /// variable not in the set. Unification orients bindings by the order of
    /// its arguments; `avoid` re-orients them afterwards so the preferred
    /// variables survive.
    pub fn avoid(&mut self, vars: &BTreeSet<FreeVar>) {
        for var in vars {
            let key = var.key();
            let Some(replacement) = self.map.get(&key).cloned() else {
                continue;
            };
            if let Term::Free(other) = &replacement {
                if !vars.contains(other) {
                    self.map.remove(&key);
                    let flip = {
                        let mut s = Substitution::new();
                        s.insert(other.key(), Term::Free(var.clone()));
                        s
                    };
                    for existing in self.map.values_mut() {
                        *existing = existing.substitute(&flip);
                    }
                    self.map.insert(other.key(), Term::Free(var.clone()));
                }
            }
        }
    }

    /// A copy of this substitution with every dangling de Bruijn index in
    /// its range shifted by `delta`. Applied before using a substitution
    /// computed outside a binder underneath that binder.
    pub fn shifted(&self, delta: i64) -> Substitution {
        Substitution {
            map: self
                .map
                .iter()
                .map(|(k, t)| (k.clone(), t.shift(delta)))
                .collect(),
        }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, ((name, stamp), term)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if *stamp == 0 {
                write!(f, "{} -> {}", name, term)?;
            } else {
                write!(f, "{}_{} -> {}", name, stamp, term)?;
            }
        }
        write!(f, "}}")
    }
}
