use crate::diagnostics::report::{Report, ReportKind};
use crate::diagnostics::reporter::{CheckContext, CheckResult, Reporter};
use crate::elaborator::clause::compute_term;
use crate::elaborator::element::{base_name, Element, FormId, SourceClause, SourceElement, SyntaxId};
use crate::elaborator::grammar::{AssumptionRule, GrammarTable};
use crate::location::Span;
use crate::module::{ModuleDescriptor, ModuleResolver};

/// The concrete-syntax parser capability. The core never parses text
/// itself; a parser hands it the structured unit and records its own
/// reports (expected-token, lexical) in the reporter it is given.
pub trait Parser {
    /// Parse one unit. Returns None if no syntax tree could be formed, in
    /// which case at least one error must have been reported.
    fn parse(&self, filename: &str, source: &str, reporter: &mut Reporter) -> Option<CompUnit>;
}

/// One parsed compilation unit: an ordered sequence of top-level
/// declarations.
#[derive(Clone, Debug)]
pub struct CompUnit {
    pub name: String,
    pub declarations: Vec<Declaration>,
}

/// A top-level declaration.
#[derive(Clone, Debug)]
pub enum Declaration {
    Syntax(SyntaxDecl),
    Judgment(JudgmentDecl),
    Theorem(TheoremDecl),
    Module(ModulePart),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Syntax(s) => &s.name,
            Declaration::Judgment(j) => &j.name,
            Declaration::Theorem(t) => &t.name,
            Declaration::Module(m) => &m.name,
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            Declaration::Syntax(_) => "syntax",
            Declaration::Judgment(_) => "judgment",
            Declaration::Theorem(t) => &t.kind,
            Declaration::Module(_) => "module",
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            Declaration::Syntax(s) => &s.span,
            Declaration::Judgment(j) => &j.span,
            Declaration::Theorem(t) => &t.span,
            Declaration::Module(m) => &m.span,
        }
    }
}

/// A syntax declaration: a nonterminal and its productions. A production
/// consisting of a single variable element declares the category's variable
/// naming convention rather than a constructor.
#[derive(Clone, Debug)]
pub struct SyntaxDecl {
    pub name: String,
    pub span: Span,
    pub productions: Vec<SourceClause>,
}

/// A judgment declaration: its form clause, the context nonterminal it
/// assumes (if any), and its inference rules.
#[derive(Clone, Debug)]
pub struct JudgmentDecl {
    pub name: String,
    pub span: Span,
    pub form: SourceClause,
    pub assume: Option<String>,
    pub rules: Vec<RuleDecl>,
}

#[derive(Clone, Debug)]
pub struct RuleDecl {
    pub name: String,
    pub span: Span,
    pub premises: Vec<SourceClause>,
    pub conclusion: SourceClause,
}

/// A theorem (or lemma): universally quantified facts, a conclusion, and
/// the proof steps justifying it. Case-analysis patterns appear as steps.
#[derive(Clone, Debug)]
pub struct TheoremDecl {
    pub name: String,
    pub kind: String,
    pub span: Span,
    pub foralls: Vec<SourceClause>,
    pub conclusion: SourceClause,
    pub steps: Vec<ProofStep>,
}

#[derive(Clone, Debug)]
pub struct ProofStep {
    pub label: String,
    pub span: Span,
    pub clause: SourceClause,
}

/// An inclusion of another module.
#[derive(Clone, Debug)]
pub struct ModulePart {
    pub name: String,
    pub span: Span,
    pub module: ModuleDescriptor,
}

impl CompUnit {
    pub fn theorems(&self) -> impl Iterator<Item = &TheoremDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Theorem(t) => Some(t),
            _ => None,
        })
    }

    pub fn judgments(&self) -> impl Iterator<Item = &JudgmentDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Judgment(j) => Some(j),
            _ => None,
        })
    }

    pub fn syntaxes(&self) -> impl Iterator<Item = &SyntaxDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Syntax(s) => Some(s),
            _ => None,
        })
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModulePart> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Module(m) => Some(m),
            _ => None,
        })
    }

    /// Check this unit: build the grammar tables from its declarations,
    /// then elaborate every rule, inclusion, and theorem. All failures are
    /// recoverable reports; each declaration, rule, and proof step is a
    /// recovery point, so one failure never hides the rest of the unit.
    pub fn check(&self, mut resolver: Option<&mut dyn ModuleResolver>, ctx: &mut CheckContext) {
        let mut grammar = GrammarTable::new();

        // Declare all syntax categories and their variable conventions
        // before resolving anything, so productions can refer forward.
        for decl in &self.declarations {
            if let Declaration::Syntax(s) = decl {
                let id = grammar.declare_syntax(&s.name, s.span.clone());
                for production in &s.productions {
                    if let [SourceElement::Variable { name, .. }] = production.elements.as_slice() {
                        grammar.declare_variable(name, id);
                    }
                }
            }
        }

        // One constructor per remaining production.
        for decl in &self.declarations {
            if let Declaration::Syntax(s) = decl {
                let syntax = grammar
                    .lookup_syntax(&s.name)
                    .expect("syntax was declared in the previous pass");
                for (index, production) in s.productions.iter().enumerate() {
                    if is_variable_production(production) {
                        continue;
                    }
                    let _ = add_production(&mut grammar, &s.name, syntax, index, production, ctx);
                }
            }
        }

        // Judgment forms. The assumption index is the position of the
        // assumed context nonterminal within the form.
        for decl in &self.declarations {
            if let Declaration::Judgment(j) = decl {
                let jid = grammar.declare_judgment(&j.name, j.span.clone());
                let elements = match grammar.resolve_shape(&j.form, ctx) {
                    Ok(elements) => elements,
                    Err(_) => continue,
                };
                let assume_index = j.assume.as_ref().and_then(|assumed| {
                    elements.iter().position(|e| {
                        matches!(e, Element::NonTerminal(nt)
                            if base_name(&nt.name) == base_name(assumed))
                    })
                });
                grammar.add_constructor(&j.name, FormId::Judgment(jid), elements, assume_index);
            }
        }

        // Rules. A rule whose conclusion's assumption slot directly
        // introduces a variable is registered as the assumption rule for
        // that context form, before anything is elaborated against it.
        for decl in &self.declarations {
            if let Declaration::Judgment(j) = decl {
                for rule in &j.rules {
                    let _ = check_rule(rule, &mut grammar, ctx);
                }
            }
        }

        // Module inclusions go through the external resolver. The included
        // unit was processed by its own session; only a failure to resolve
        // lands in this sink.
        for decl in &self.declarations {
            if let Declaration::Module(m) = decl {
                match resolver.as_mut() {
                    Some(r) => {
                        if let Err(e) = r.resolve(&m.module) {
                            ctx.reporter.error(
                                ReportKind::Unspecified,
                                m.span.clone(),
                                format!("cannot include module {}: {}", m.module, e),
                            );
                        }
                    }
                    None => {
                        ctx.reporter.error(
                            ReportKind::Unspecified,
                            m.span.clone(),
                            format!("cannot include module {}: no resolver available", m.module),
                        );
                    }
                }
            }
        }

        // Theorems last, with every proof step its own recovery point.
        for decl in &self.declarations {
            if let Declaration::Theorem(t) = decl {
                check_theorem(t, &grammar, ctx);
            }
        }
    }
}

fn is_variable_production(production: &SourceClause) -> bool {
    matches!(
        production.elements.as_slice(),
        [SourceElement::Variable { .. }]
    )
}

fn add_production(
    grammar: &mut GrammarTable,
    syntax_name: &str,
    syntax: SyntaxId,
    index: usize,
    production: &SourceClause,
    ctx: &mut CheckContext,
) -> CheckResult<()> {
    let elements = grammar.resolve_shape(production, ctx)?;
    let name = production_name(syntax_name, index, &elements);
    grammar.add_constructor(&name, FormId::Syntax(syntax), elements, None);
    Ok(())
}

/// Derive a constructor name from the production's first word-like
/// terminal, falling back to the production's position.
fn production_name(syntax_name: &str, index: usize, elements: &[Element]) -> String {
    for e in elements {
        if let Element::Terminal(t) = e {
            if !t.text.is_empty()
                && t.text
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return format!("{}-{}", syntax_name, t.text);
            }
        }
    }
    format!("{}-{}", syntax_name, index)
}

fn check_rule(rule: &RuleDecl, grammar: &mut GrammarTable, ctx: &mut CheckContext) -> CheckResult<()> {
    let conclusion = grammar.resolve(&rule.conclusion, ctx)?;

    let assume_index = grammar.constructor(conclusion.constructor).assume_index;
    if let Some(ai) = assume_index {
        if let Element::Clause(context) = &conclusion.elements[ai] {
            let introduces_variable = context
                .elements
                .iter()
                .any(|e| matches!(e, Element::Variable(_)));
            if introduces_variable {
                grammar.register_assumption_rule(
                    context.constructor,
                    AssumptionRule {
                        name: rule.name.clone(),
                        conclusion: conclusion.clone(),
                    },
                );
            }
        }
    }

    compute_term(&conclusion, grammar, ctx)?;
    for premise in &rule.premises {
        let premise = grammar.resolve(premise, ctx)?;
        compute_term(&premise, grammar, ctx)?;
    }
    Ok(())
}

fn check_theorem(theorem: &TheoremDecl, grammar: &GrammarTable, ctx: &mut CheckContext) {
    for forall in &theorem.foralls {
        let _ = elaborate_clause(forall, grammar, ctx);
    }
    let _ = elaborate_clause(&theorem.conclusion, grammar, ctx);

    if theorem.steps.is_empty() {
        ctx.reporter.report(Report::new(
            ReportKind::DerivationUnproved,
            theorem.span.clone(),
            format!("{} {} has no proof", theorem.kind, theorem.name),
        ));
    }
    for step in &theorem.steps {
        let _ = elaborate_clause(&step.clause, grammar, ctx);
    }
}

fn elaborate_clause(
    clause: &SourceClause,
    grammar: &GrammarTable,
    ctx: &mut CheckContext,
) -> CheckResult<()> {
    let resolved = grammar.resolve(clause, ctx)?;
    compute_term(&resolved, grammar, ctx)?;
    Ok(())
}
