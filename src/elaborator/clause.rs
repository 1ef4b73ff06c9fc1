use tracing::trace;

use crate::diagnostics::report::{Report, ReportKind};
use crate::diagnostics::reporter::{CheckContext, CheckResult};
use crate::elaborator::element::{Binding, ClauseUse, Element, FormId, NonTerminal, Variable};
use crate::elaborator::grammar::GrammarTable;
use crate::kernel::substitution::Substitution;
use crate::kernel::term::{FreeVar, Term};
use crate::kernel::unifier::unify_allowing_bound_renaming;

/// What kind of entry a collected variable binding is. Assumed variables
/// come in pairs: the variable itself, then the synthesized derivation that
/// justifies assuming it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    Var,
    Derivation,
}

/// One collected (name, term) binding. For a Var entry the term is the
/// variable's sort; for a Derivation entry it is the synthesized derivation
/// term, or a placeholder when derivations were not requested.
#[derive(Clone, Debug)]
pub struct BindingEntry {
    pub name: String,
    pub term: Term,
    pub kind: EntryKind,
}

/// The result of classifying a clause's assumption chain: the root marker
/// (set when the innermost assumption tail is a bare nonterminal) and the
/// ordered variable bindings, outermost binder first.
///
/// This is a value computed by one pure pass and consumed by the term
/// computation, so the elaboration entry points have no hidden ordering
/// dependency between them.
#[derive(Clone, Debug, Default)]
pub struct AssumptionAnalysis {
    pub root: Option<NonTerminal>,
    pub bindings: Vec<BindingEntry>,
}

impl AssumptionAnalysis {
    /// True iff the assumptions environment is rooted in a variable.
    pub fn rooted_in_var(&self) -> bool {
        self.root.is_some()
    }
}

/// Classify the assumption chain of a clause. If the clause's constructor
/// has no assumption index, the analysis is empty. With
/// `include_derivations`, assumed variables get real synthesized derivation
/// terms; without it, the derivation entries carry placeholders but still
/// occupy their binder positions, so de Bruijn indices agree between the
/// base and full term computations.
pub fn classify_assumptions(
    clause: &ClauseUse,
    include_derivations: bool,
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
) -> CheckResult<AssumptionAnalysis> {
    let cons = grammar.constructor(clause.constructor);
    let mut analysis = AssumptionAnalysis::default();
    if let Some(ai) = cons.assume_index {
        match &clause.elements[ai] {
            Element::NonTerminal(nt) => analysis.root = Some(nt.clone()),
            Element::Clause(cu) => {
                read_assumptions(cu, include_derivations, grammar, ctx, &mut analysis)?
            }
            _ => {}
        }
    }
    Ok(analysis)
}

/// Compute the canonical term for a clause: the basic term wrapped with one
/// abstraction per collected assumption binding, outermost first in reverse
/// collection order.
pub fn compute_term(
    clause: &ClauseUse,
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
) -> CheckResult<Term> {
    let cons = grammar.constructor(clause.constructor);
    let has_assumptions = cons.assume_index.is_some();
    let analysis = classify_assumptions(clause, true, grammar, ctx)?;
    let term = basic_term(clause, &analysis.bindings, false, grammar, ctx)?;
    let term = if has_assumptions {
        wrap_assumptions(term, &analysis.bindings)
    } else {
        term
    };
    trace!("converted {} to {}", clause.span, term);
    Ok(term)
}

/// Compute the term for a clause without the outer assumption abstractions.
pub fn base_term(
    clause: &ClauseUse,
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
) -> CheckResult<Term> {
    let analysis = classify_assumptions(clause, false, grammar, ctx)?;
    basic_term(clause, &analysis.bindings, false, grammar, ctx)
}

/// Wrap the basic term with the collected bindings. Inside the type of the
/// binder for entry i, a reference to the variable of entry j (j < i) is a
/// bound reference at index i - 1 - j, so earlier-bound names are captured
/// into later binder types here.
fn wrap_assumptions(mut term: Term, bindings: &[BindingEntry]) -> Term {
    for i in (0..bindings.len()).rev() {
        let entry = &bindings[i];
        let targets: Vec<(FreeVar, usize)> = bindings[..i]
            .iter()
            .enumerate()
            .filter(|(_, b)| b.kind == EntryKind::Var)
            .map(|(j, b)| {
                let var = FreeVar {
                    name: b.name.clone(),
                    stamp: 0,
                    ty: Box::new(b.term.clone()),
                };
                (var, i - 1 - j)
            })
            .collect();
        let mut capture = Substitution::new();
        entry.term.bind_each_at(&targets, &mut capture);
        let ty = entry.term.substitute(&capture);
        term = Term::abstraction(&entry.name, ty, term);
    }
    term
}

/// Build the main part of the term, without nested assumption abstractions.
/// `in_assumption` means we are computing the shape of an assumption clause,
/// in which a nested same-form clause is replaced by a fresh placeholder
/// variable to terminate what would otherwise unfold the whole assumption
/// list.
fn basic_term(
    clause: &ClauseUse,
    bindings: &[BindingEntry],
    in_assumption: bool,
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
) -> CheckResult<Term> {
    let cons = grammar.constructor(clause.constructor);
    let head = cons.head_term(grammar);
    let mut args = Vec::new();
    trace!("converting {} with assumed vars {}", clause.span, bindings.len());

    for (i, e) in clause.elements.iter().enumerate() {
        if matches!(e, Element::Terminal(_)) {
            continue;
        }
        if cons.assume_index == Some(i) {
            continue;
        }
        if matches!(cons.elements.get(i), Some(Element::Variable(_))) {
            // A declared bound position; the binder that captures it lives
            // on whichever binding group declared it.
            continue;
        }

        let arg = if let Some(Element::Binding(decl)) = cons.elements.get(i) {
            binding_group_term(clause, e, decl, bindings, grammar, ctx)?
        } else if in_assumption && is_same_form_clause(e, cons.form) {
            Term::Free(ctx.supply.fresh("Assumptions", Term::unknown_type()))
        } else {
            element_term(e, bindings, grammar, ctx)?
        };
        args.push(arg);
    }

    Ok(Term::application(head, args))
}

fn is_same_form_clause(e: &Element, form: FormId) -> bool {
    matches!(e, Element::Clause(inner) if inner.form == form)
}

/// Compute the term for a position whose declared shape is a binding group:
/// look up the local variable occupying each declared bound position, extend
/// the binding list with them in reverse declaration order (inner binders
/// must nest inside outer ones), compute the child under the extended list,
/// and wrap it with exactly that many abstractions.
fn binding_group_term(
    clause: &ClauseUse,
    child: &Element,
    decl: &Binding,
    bindings: &[BindingEntry],
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
) -> CheckResult<Term> {
    let cons = grammar.constructor(clause.constructor);
    let mut extended = bindings.to_vec();
    let mut added: Vec<(String, Term)> = Vec::new();

    for decl_arg in decl.args.iter().rev() {
        let Element::Variable(decl_var) = decl_arg else {
            continue;
        };
        let Some(var_index) = cons.index_of_variable(&decl_var.name) else {
            trace!(
                "could not find {} in constructor {} at {}",
                decl_var.name,
                cons.name,
                clause.span
            );
            continue;
        };
        let occupant = &clause.elements[var_index];
        let Element::Variable(local) = occupant else {
            return Err(ctx.reporter.halt(Report::new(
                ReportKind::ExpectedVariable,
                occupant.span().clone(),
                format!(
                    "expected variable matching {} but found a non-variable",
                    decl_var.name
                ),
            )));
        };
        let ty = grammar.syntax_sort(local.syntax);
        added.push((local.name.clone(), ty.clone()));
        extended.push(BindingEntry {
            name: local.name.clone(),
            term: ty,
            kind: EntryKind::Var,
        });
    }

    let mut term = element_term(child, &extended, grammar, ctx)?;
    for (name, ty) in added.iter().rev() {
        term = Term::abstraction(name, ty.clone(), term);
    }
    Ok(term)
}

/// The term contributed by a single element under the given bindings.
fn element_term(
    e: &Element,
    bindings: &[BindingEntry],
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
) -> CheckResult<Term> {
    match e {
        Element::Terminal(t) => {
            panic!("terminal {:?} has no term", t.text)
        }
        Element::NonTerminal(nt) => Ok(Term::free_named(&nt.name, grammar.syntax_sort(nt.syntax))),
        Element::Variable(v) => {
            match bindings.iter().rposition(|b| b.name == v.name) {
                Some(pos) => Ok(Term::bound(bindings.len() - 1 - pos)),
                None => Ok(Term::free_named(&v.name, grammar.syntax_sort(v.syntax))),
            }
        }
        Element::Binding(b) => {
            let head = Term::free_named(&b.name, grammar.syntax_sort(b.syntax));
            let mut args = Vec::with_capacity(b.args.len());
            for arg in &b.args {
                args.push(element_term(arg, bindings, grammar, ctx)?);
            }
            Ok(Term::application(head, args))
        }
        Element::Clause(cu) => basic_term(cu, bindings, false, grammar, ctx),
    }
}

/// Walk an assumption clause, collecting its variable bindings and root.
/// A well-formed assumption clause has at most one nested assumption tail
/// (a same-form clause or nonterminal) and at most one bare variable.
fn read_assumptions(
    cu: &ClauseUse,
    include_derivations: bool,
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
    out: &mut AssumptionAnalysis,
) -> CheckResult<()> {
    let cons = grammar.constructor(cu.constructor);

    let mut found_tail = false;
    for e in &cu.elements {
        match e {
            Element::Clause(inner) if inner.form == cons.form => {
                if found_tail {
                    return Err(ctx.reporter.halt(Report::new(
                        ReportKind::AmbiguousAssumption,
                        cu.span.clone(),
                        "an assumption case must not have more than one nested list of assumptions"
                            .to_string(),
                    )));
                }
                found_tail = true;
                read_assumptions(inner, include_derivations, grammar, ctx, out)?;
            }
            Element::NonTerminal(nt) if FormId::Syntax(nt.syntax) == cons.form => {
                if found_tail {
                    return Err(ctx.reporter.halt(Report::new(
                        ReportKind::AmbiguousAssumption,
                        cu.span.clone(),
                        "an assumption case must not have more than one nested list of assumptions"
                            .to_string(),
                    )));
                }
                found_tail = true;
                out.root = Some(nt.clone());
            }
            _ => {}
        }
    }

    let mut found_var = false;
    for e in &cu.elements {
        if let Element::Variable(v) = e {
            if found_var {
                return Err(ctx.reporter.halt(Report::new(
                    ReportKind::AmbiguousAssumption,
                    cu.span.clone(),
                    "an assumption case must not have more than one variable".to_string(),
                )));
            }
            found_var = true;
            synthesize_assumption(cu, v, include_derivations, grammar, ctx, out)?;
        }
    }

    Ok(())
}

/// A bare fresh variable occupies the assumption slot: manufacture the
/// formal derivation for "this assumption was introduced here".
///
/// The registered assumption rule's conclusion is the template. Its context
/// sub-clause term is freshened and unified against the locally-built clause
/// term, giving the adaptation substitution; that substitution, shifted by
/// one binder position, reshapes the rule's own conclusion term into the
/// synthesized derivation. The variable and its derivation are appended as
/// two consecutive binding entries.
fn synthesize_assumption(
    cu: &ClauseUse,
    v: &Variable,
    include_derivations: bool,
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
    out: &mut AssumptionAnalysis,
) -> CheckResult<()> {
    let cons = grammar.constructor(cu.constructor);
    let Some(rule) = cons.assumption_rule.clone() else {
        return Err(ctx.reporter.halt(Report::new(
            ReportKind::MissingAssumptionRule,
            cu.span.clone(),
            format!(
                "there is no rule for using an assumption of the form {}",
                cons.name
            ),
        )));
    };

    let var_sort = grammar.syntax_sort(v.syntax);
    let deriv_name = format!("{}_assumption", v.name);

    let deriv = if include_derivations {
        // The local clause's shape, with the assumption tail cut off at a
        // fresh placeholder.
        let my_term = basic_term(cu, &out.bindings, true, grammar, ctx)?;

        let rc = &rule.conclusion;
        let rc_cons = grammar.constructor(rc.constructor);
        let ai = rc_cons
            .assume_index
            .expect("assumption rule conclusion has no assumption slot");
        let Element::Clause(rc_context) = &rc.elements[ai] else {
            panic!("assumption rule conclusion's assumption slot is not a clause");
        };

        // Freshen the template and the derivation shape together, so
        // metavariables shared between them stay shared.
        let template = basic_term(rc_context, &[], false, grammar, ctx)?;
        let deriv_shape = base_term(rc, grammar, ctx)?;
        let mut fresh_sub = Substitution::new();
        template.freshen_into(&mut ctx.supply, &mut fresh_sub);
        deriv_shape.freshen_into(&mut ctx.supply, &mut fresh_sub);
        let template = template.substitute(&fresh_sub);

        // Capture the context variables collected so far one binder up, so
        // the template can meet a clause that mentions them.
        let ctx_vars: Vec<FreeVar> = out
            .bindings
            .iter()
            .filter(|b| b.kind == EntryKind::Var)
            .map(|b| FreeVar {
                name: b.name.clone(),
                stamp: 0,
                ty: Box::new(b.term.clone()),
            })
            .collect();
        let mut binding_sub = Substitution::new();
        template.bind_free_as_bound(&ctx_vars, &mut binding_sub, 1);
        let template = template.substitute(&binding_sub);

        trace!("unifying assumption {} against template {}", my_term, template);
        let mut adaptation = match unify_allowing_bound_renaming(&my_term, &template) {
            Ok(sub) => sub,
            Err(e) => {
                return Err(ctx.reporter.halt(Report::with_extra(
                    ReportKind::DerivationShapeMismatch,
                    cu.span.clone(),
                    format!(
                        "assumption does not fit the form required by rule {}",
                        rule.name
                    ),
                    e.to_string(),
                )));
            }
        };
        // Keep the clause's own variables on the outside of the adaptation.
        adaptation.avoid(&my_term.free_variables());
        trace!("adaptation substitution: {}", adaptation);

        // The derivation shape was computed relative to a context that
        // includes the derivation's own binder; its type lives one binder
        // out, so the shape shifts down once and the substitutions computed
        // outside the variable's binder shift up once.
        let deriv = deriv_shape
            .substitute(&fresh_sub)
            .shift(-1)
            .substitute(&binding_sub.shifted(1))
            .substitute(&adaptation.shifted(1));
        trace!("synthesized derivation: {}", deriv);
        Some(deriv)
    } else {
        None
    };

    out.bindings.push(BindingEntry {
        name: v.name.clone(),
        term: var_sort,
        kind: EntryKind::Var,
    });
    out.bindings.push(BindingEntry {
        name: deriv_name,
        term: deriv.unwrap_or_else(Term::unknown_type),
        kind: EntryKind::Derivation,
    });
    Ok(())
}

/// The number of lambdas that must be added to `term` so it matches
/// `match_term`: zero unless the assumptions environment is rooted in a
/// variable (or the caller forces wrapping), and never negative.
pub fn adaptation_number(
    term: &Term,
    match_term: &Term,
    rooted_in_var: bool,
    wrap_unrooted: bool,
) -> usize {
    if !rooted_in_var && !wrap_unrooted {
        return 0;
    }
    match_term
        .count_outer_abstractions()
        .saturating_sub(term.count_outer_abstractions())
}

/// Reconcile a derivation proved in a smaller local context with the larger
/// context `match_term` expects: the weakening step between proof steps.
/// Extends `sub` with the rebindings performed.
pub fn adapt_term_to(
    term: &Term,
    match_term: &Term,
    sub: &mut Substitution,
    rooted_in_var: bool,
    wrap_unrooted: bool,
) -> Term {
    let n = adaptation_number(term, match_term, rooted_in_var, wrap_unrooted);
    let result = wrap_with_outer_lambdas(term, match_term, n, sub);
    trace!("adapted {} to {}", term, result);
    result
}

/// Read the names and types of the first `n` outer abstractions of a term,
/// outermost first.
pub fn read_names_and_types(match_term: &Term, n: usize) -> (Vec<String>, Vec<Term>) {
    let mut names = Vec::with_capacity(n);
    let mut types = Vec::with_capacity(n);
    let mut current = match_term;
    for _ in 0..n {
        let Term::Abstraction(abs) = current else {
            panic!(
                "cannot read {} outer abstractions from {}",
                n, match_term
            );
        };
        names.push(abs.name.clone());
        types.push((*abs.var_ty).clone());
        current = &abs.body;
    }
    (names, types)
}

/// Wrap `term` in `n` abstractions whose names and types are read off
/// `match_term`, rebinding the free variables named like the new binders so
/// they become properly-indexed bound references. The rebinding is recorded
/// in `sub`.
pub fn wrap_with_outer_lambdas(
    term: &Term,
    match_term: &Term,
    n: usize,
    sub: &mut Substitution,
) -> Term {
    if n == 0 {
        return term.clone();
    }
    let (names, types) = read_names_and_types(match_term, n);

    let targets: Vec<(FreeVar, usize)> = term
        .free_variables()
        .into_iter()
        .filter_map(|v| {
            names
                .iter()
                .position(|name| *name == v.name)
                .map(|j| (v, n - 1 - j))
        })
        .collect();
    term.bind_each_at(&targets, sub);

    let mut result = term.substitute(sub);
    for j in (0..n).rev() {
        result = Term::abstraction(&names[j], types[j].clone(), result);
    }
    result
}
