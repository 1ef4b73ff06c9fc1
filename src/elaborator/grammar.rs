use std::collections::BTreeMap;

use crate::diagnostics::report::{Report, ReportKind};
use crate::diagnostics::reporter::{CheckContext, CheckResult};
use crate::elaborator::element::{
    base_name, Binding, ClauseUse, ConstructorId, ElemKey, Element, FormId, JudgmentId,
    NonTerminal, SourceClause, SourceElement, SyntaxId, Terminal, Variable,
};
use crate::kernel::term::Term;
use crate::location::Span;

/// A declared syntactic category, like t or Gamma.
#[derive(Clone, Debug)]
pub struct SyntaxForm {
    pub name: String,
    pub span: Span,
}

/// A declared judgment form, like "Gamma |- t : T".
#[derive(Clone, Debug)]
pub struct JudgmentForm {
    pub name: String,
    pub span: Span,
}

/// The rule registered to justify using an assumption of a given context
/// form: when a derivation assumes a fresh variable, this rule's conclusion
/// is the template the synthesized derivation is adapted from.
#[derive(Clone, Debug)]
pub struct AssumptionRule {
    pub name: String,
    pub conclusion: ClauseUse,
}

/// One grammar production or judgment form, mapped from an ordered
/// element-kind signature.
#[derive(Clone, Debug)]
pub struct ConstructorDef {
    pub name: String,
    pub form: FormId,
    /// The declared shape. Variable elements mark bound positions; Binding
    /// elements mark positions that bind them.
    pub elements: Vec<Element>,
    /// The position, if any, that introduces a fresh bound context.
    pub assume_index: Option<usize>,
    /// Set while processing judgment rules; immutable afterwards.
    pub assumption_rule: Option<AssumptionRule>,
}

impl ConstructorDef {
    /// The head constant this constructor contributes to computed terms.
    pub fn head_term(&self, grammar: &GrammarTable) -> Term {
        let ty = match self.form {
            FormId::Syntax(id) => grammar.syntax_sort(id),
            FormId::Judgment(id) => grammar.judgment_sort(id),
        };
        Term::constant(&self.name, ty)
    }

    /// The position of the declared Variable element with the given name.
    pub fn index_of_variable(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|e| match e {
            Element::Variable(v) => v.name == name,
            _ => false,
        })
    }
}

/// The per-unit grammar: syntax forms, judgment forms, constructors, and
/// the signature map used to resolve clause usages. Built once by the
/// declaration passes, then used read-only while theorems are checked.
#[derive(Debug, Default)]
pub struct GrammarTable {
    syntaxes: Vec<SyntaxForm>,
    syntax_by_name: BTreeMap<String, SyntaxId>,
    /// Maps a variable base name (like x) to the category its variables
    /// range over. Populated by lone-variable productions like "t ::= x".
    variable_of: BTreeMap<String, SyntaxId>,
    judgments: Vec<JudgmentForm>,
    constructors: Vec<ConstructorDef>,
    signatures: BTreeMap<Vec<ElemKey>, ConstructorId>,
}

impl GrammarTable {
    pub fn new() -> GrammarTable {
        GrammarTable::default()
    }

    pub fn declare_syntax(&mut self, name: &str, span: Span) -> SyntaxId {
        if let Some(&id) = self.syntax_by_name.get(name) {
            return id;
        }
        let id = self.syntaxes.len();
        self.syntaxes.push(SyntaxForm {
            name: name.to_string(),
            span,
        });
        self.syntax_by_name.insert(name.to_string(), id);
        id
    }

    pub fn declare_variable(&mut self, var_name: &str, syntax: SyntaxId) {
        self.variable_of
            .insert(base_name(var_name).to_string(), syntax);
    }

    pub fn declare_judgment(&mut self, name: &str, span: Span) -> JudgmentId {
        let id = self.judgments.len();
        self.judgments.push(JudgmentForm {
            name: name.to_string(),
            span,
        });
        id
    }

    pub fn syntax(&self, id: SyntaxId) -> &SyntaxForm {
        &self.syntaxes[id]
    }

    pub fn judgment(&self, id: JudgmentId) -> &JudgmentForm {
        &self.judgments[id]
    }

    pub fn constructor(&self, id: ConstructorId) -> &ConstructorDef {
        &self.constructors[id]
    }

    pub fn lookup_syntax(&self, name: &str) -> Option<SyntaxId> {
        self.syntax_by_name.get(base_name(name)).copied()
    }

    pub fn lookup_variable(&self, name: &str) -> Option<SyntaxId> {
        self.variable_of.get(base_name(name)).copied()
    }

    /// The sort term for a syntactic category.
    pub fn syntax_sort(&self, id: SyntaxId) -> Term {
        Term::constant(&self.syntaxes[id].name, Term::type_sort())
    }

    /// The sort term for a judgment form.
    pub fn judgment_sort(&self, id: JudgmentId) -> Term {
        Term::constant(&self.judgments[id].name, Term::type_sort())
    }

    /// Add a constructor for an already-resolved declared shape.
    /// The signature is derived from the shape.
    pub fn add_constructor(
        &mut self,
        name: &str,
        form: FormId,
        elements: Vec<Element>,
        assume_index: Option<usize>,
    ) -> ConstructorId {
        let signature = self.signature_of(&elements);
        let id = self.constructors.len();
        self.constructors.push(ConstructorDef {
            name: name.to_string(),
            form,
            elements,
            assume_index,
            assumption_rule: None,
        });
        self.signatures.insert(signature, id);
        id
    }

    /// Register the rule that justifies assumptions of the given context
    /// constructor. First registration wins; the original keeps the rule
    /// closest to the declaration.
    pub fn register_assumption_rule(&mut self, constructor: ConstructorId, rule: AssumptionRule) {
        let slot = &mut self.constructors[constructor].assumption_rule;
        if slot.is_none() {
            *slot = Some(rule);
        }
    }

    fn signature_of(&self, elements: &[Element]) -> Vec<ElemKey> {
        elements
            .iter()
            .map(|e| match e {
                Element::Terminal(t) => ElemKey::Terminal(t.text.clone()),
                Element::NonTerminal(nt) => ElemKey::Form(nt.syntax),
                Element::Variable(v) => ElemKey::Form(v.syntax),
                Element::Binding(b) => ElemKey::Form(b.syntax),
                Element::Clause(c) => match c.form {
                    FormId::Syntax(id) => ElemKey::Form(id),
                    // Screened during resolution; a judgment can never be an
                    // element of another clause.
                    FormId::Judgment(_) => unreachable!("judgment nested in clause signature"),
                },
            })
            .collect()
    }

    /// Resolve a declared shape's elements against the known categories,
    /// without looking anything up in the signature map. Used when a
    /// production or judgment form is being added to the table.
    pub fn resolve_shape(
        &self,
        clause: &SourceClause,
        ctx: &mut CheckContext,
    ) -> CheckResult<Vec<Element>> {
        let mut elements = Vec::with_capacity(clause.elements.len());
        for raw in &clause.elements {
            elements.push(self.resolve_element(raw, ctx)?);
        }
        Ok(elements)
    }

    /// Resolve a parsed clause into a `ClauseUse` by matching its element
    /// signature against the declared constructors. Nested clauses resolve
    /// bottom-up. Reports and halts if any element is unknown, a judgment
    /// appears nested inside a clause, or no constructor matches.
    pub fn resolve(&self, clause: &SourceClause, ctx: &mut CheckContext) -> CheckResult<ClauseUse> {
        let elements = self.resolve_shape(clause, ctx)?;
        let signature = self.signature_of(&elements);
        match self.signatures.get(&signature) {
            Some(&id) => Ok(ClauseUse {
                constructor: id,
                form: self.constructors[id].form,
                elements,
                span: clause.span.clone(),
            }),
            None => Err(ctx.reporter.halt(Report::new(
                ReportKind::NoMatchingConstructor,
                clause.span.clone(),
                format!(
                    "cannot find a syntax constructor or judgment for expression {}",
                    clause
                ),
            ))),
        }
    }

    fn resolve_element(
        &self,
        raw: &SourceElement,
        ctx: &mut CheckContext,
    ) -> CheckResult<Element> {
        match raw {
            SourceElement::Terminal { text, span } => Ok(Element::Terminal(Terminal {
                text: text.clone(),
                span: span.clone(),
            })),
            SourceElement::NonTerminal { name, span } => match self.lookup_syntax(name) {
                Some(syntax) => Ok(Element::NonTerminal(NonTerminal {
                    name: name.clone(),
                    syntax,
                    span: span.clone(),
                })),
                None => Err(ctx.reporter.halt(Report::new(
                    ReportKind::Unspecified,
                    span.clone(),
                    format!("unknown syntactic category: {}", name),
                ))),
            },
            SourceElement::Variable { name, span } => match self.lookup_variable(name) {
                Some(syntax) => Ok(Element::Variable(Variable {
                    name: name.clone(),
                    syntax,
                    span: span.clone(),
                })),
                None => Err(ctx.reporter.halt(Report::new(
                    ReportKind::Unspecified,
                    span.clone(),
                    format!("no syntax declares variables named {}", name),
                ))),
            },
            SourceElement::Binding { name, args, span } => {
                let syntax = match self.lookup_syntax(name) {
                    Some(syntax) => syntax,
                    None => {
                        return Err(ctx.reporter.halt(Report::new(
                            ReportKind::Unspecified,
                            span.clone(),
                            format!("unknown syntactic category: {}", name),
                        )))
                    }
                };
                let mut resolved_args = Vec::with_capacity(args.len());
                for arg in args {
                    resolved_args.push(self.resolve_element(arg, ctx)?);
                }
                Ok(Element::Binding(Binding {
                    name: name.clone(),
                    syntax,
                    args: resolved_args,
                    span: span.clone(),
                }))
            }
            SourceElement::Clause(nested) => {
                let resolved = self.resolve(nested, ctx)?;
                if let FormId::Judgment(_) = resolved.form {
                    return Err(ctx.reporter.halt(Report::new(
                        ReportKind::JudgmentInClause,
                        nested.span.clone(),
                        "a judgment cannot appear inside a clause".to_string(),
                    )));
                }
                Ok(Element::Clause(resolved))
            }
        }
    }
}
