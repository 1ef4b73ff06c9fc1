use crate::diagnostics::report::Report;
use crate::diagnostics::reporter::{CheckContext, Reporter};
use crate::elaborator::element::{Element, FormId, SourceClause, SourceElement};
use crate::elaborator::grammar::{AssumptionRule, GrammarTable};
use crate::location::Span;
use crate::module::{ImportError, ModuleDescriptor, ModuleResolver};
use crate::unit::{
    CompUnit, Declaration, JudgmentDecl, ModulePart, Parser, ProofStep, RuleDecl, SyntaxDecl,
    TheoremDecl,
};

pub fn sp() -> Span {
    Span::point("test.lrc", 1, 1)
}

pub fn term(text: &str) -> SourceElement {
    SourceElement::Terminal {
        text: text.to_string(),
        span: sp(),
    }
}

pub fn nt(name: &str) -> SourceElement {
    SourceElement::NonTerminal {
        name: name.to_string(),
        span: sp(),
    }
}

pub fn var(name: &str) -> SourceElement {
    SourceElement::Variable {
        name: name.to_string(),
        span: sp(),
    }
}

pub fn binding(name: &str, vars: &[&str]) -> SourceElement {
    SourceElement::Binding {
        name: name.to_string(),
        args: vars.iter().map(|v| var(v)).collect(),
        span: sp(),
    }
}

pub fn clause(elements: Vec<SourceElement>) -> SourceClause {
    SourceClause {
        elements,
        span: sp(),
    }
}

pub fn nested(elements: Vec<SourceElement>) -> SourceElement {
    SourceElement::Clause(clause(elements))
}

/// The context-extension clause (Gamma , x : T) used by several tests.
pub fn context_cons_clause() -> SourceClause {
    clause(vec![nt("Gamma"), term(","), var("x"), term(":"), nt("T")])
}

/// The judgment use ((Gamma , x : T) |- x : T): a case pattern assuming a
/// single fresh variable.
pub fn var_case_clause() -> SourceClause {
    clause(vec![
        SourceElement::Clause(context_cons_clause()),
        term("|-"),
        var("x"),
        term(":"),
        nt("T"),
    ])
}

/// A plain judgment use (Gamma |- t : T).
pub fn plain_judgment_clause() -> SourceClause {
    clause(vec![nt("Gamma"), term("|-"), nt("t"), term(":"), nt("T")])
}

/// Build the grammar for a simply-typed lambda calculus directly through
/// the table API:
///
///   T     ::= unit | T -> T
///   t     ::= x | fn x : T => t[x] | t t
///   Gamma ::= none | Gamma , x : T | Gamma & Gamma
///   typing:   Gamma |- t : T   (assume Gamma)
///
/// With `with_var_rule`, the variable-lookup rule
/// ((Gamma , x : T) |- x : T) is registered as the assumption rule for the
/// context-extension form.
pub fn stlc_grammar(with_var_rule: bool, ctx: &mut CheckContext) -> GrammarTable {
    fn add(
        g: &mut GrammarTable,
        name: &str,
        form: FormId,
        elems: Vec<SourceElement>,
        ctx: &mut CheckContext,
    ) {
        let shape = g
            .resolve_shape(&clause(elems), ctx)
            .expect("fixture shapes always resolve");
        g.add_constructor(name, form, shape, None);
    }

    let mut g = GrammarTable::new();
    let ty = g.declare_syntax("T", sp());
    let tm = g.declare_syntax("t", sp());
    let gamma = g.declare_syntax("Gamma", sp());
    g.declare_variable("x", tm);

    add(&mut g, "T-unit", FormId::Syntax(ty), vec![term("unit")], ctx);
    add(
        &mut g,
        "T-arrow",
        FormId::Syntax(ty),
        vec![nt("T1"), term("->"), nt("T2")],
        ctx,
    );
    add(
        &mut g,
        "t-fn",
        FormId::Syntax(tm),
        vec![
            term("fn"),
            var("x"),
            term(":"),
            nt("T"),
            term("=>"),
            binding("t2", &["x"]),
        ],
        ctx,
    );
    add(
        &mut g,
        "t-app",
        FormId::Syntax(tm),
        vec![nt("t1"), nt("t2")],
        ctx,
    );
    add(
        &mut g,
        "Gamma-none",
        FormId::Syntax(gamma),
        vec![term("none")],
        ctx,
    );
    add(
        &mut g,
        "Gamma-cons",
        FormId::Syntax(gamma),
        vec![nt("Gamma"), term(","), var("x"), term(":"), nt("T")],
        ctx,
    );
    add(
        &mut g,
        "Gamma-merge",
        FormId::Syntax(gamma),
        vec![nt("Gamma1"), term("&"), nt("Gamma2")],
        ctx,
    );

    let judgment = g.declare_judgment("typing", sp());
    let form = g
        .resolve_shape(&plain_judgment_clause(), ctx)
        .expect("judgment form resolves");
    g.add_constructor("typing", FormId::Judgment(judgment), form, Some(0));

    if with_var_rule {
        let conclusion = g
            .resolve(&var_case_clause(), ctx)
            .expect("var rule conclusion resolves");
        let context_constructor = match &conclusion.elements[0] {
            Element::Clause(c) => c.constructor,
            other => panic!("expected context clause, got {:?}", other),
        };
        g.register_assumption_rule(
            context_constructor,
            AssumptionRule {
                name: "t-var".to_string(),
                conclusion,
            },
        );
    }

    g
}

/// The same lambda-calculus language as a full compilation unit, for
/// driving `CompUnit::check` and the analysis pipeline.
pub fn stlc_unit(with_var_rule: bool, theorems: Vec<TheoremDecl>) -> CompUnit {
    let mut declarations = vec![
        Declaration::Syntax(SyntaxDecl {
            name: "T".to_string(),
            span: sp(),
            productions: vec![
                clause(vec![term("unit")]),
                clause(vec![nt("T1"), term("->"), nt("T2")]),
            ],
        }),
        Declaration::Syntax(SyntaxDecl {
            name: "t".to_string(),
            span: sp(),
            productions: vec![
                clause(vec![var("x")]),
                clause(vec![
                    term("fn"),
                    var("x"),
                    term(":"),
                    nt("T"),
                    term("=>"),
                    binding("t2", &["x"]),
                ]),
                clause(vec![nt("t1"), nt("t2")]),
            ],
        }),
        Declaration::Syntax(SyntaxDecl {
            name: "Gamma".to_string(),
            span: sp(),
            productions: vec![
                clause(vec![term("none")]),
                clause(vec![nt("Gamma"), term(","), var("x"), term(":"), nt("T")]),
            ],
        }),
    ];

    let rules = if with_var_rule {
        vec![RuleDecl {
            name: "t-var".to_string(),
            span: sp(),
            premises: vec![],
            conclusion: var_case_clause(),
        }]
    } else {
        vec![]
    };
    declarations.push(Declaration::Judgment(JudgmentDecl {
        name: "typing".to_string(),
        span: sp(),
        form: plain_judgment_clause(),
        assume: Some("Gamma".to_string()),
        rules,
    }));

    declarations.extend(theorems.into_iter().map(Declaration::Theorem));

    CompUnit {
        name: "test".to_string(),
        declarations,
    }
}

pub fn theorem(name: &str, steps: Vec<SourceClause>) -> TheoremDecl {
    TheoremDecl {
        name: name.to_string(),
        kind: "theorem".to_string(),
        span: sp(),
        foralls: vec![],
        conclusion: plain_judgment_clause(),
        steps: steps
            .into_iter()
            .enumerate()
            .map(|(i, clause)| ProofStep {
                label: format!("d{}", i),
                span: sp(),
                clause,
            })
            .collect(),
    }
}

pub fn module_part(name: &str) -> Declaration {
    Declaration::Module(ModulePart {
        name: name.to_string(),
        span: sp(),
        module: ModuleDescriptor::name(name),
    })
}

/// A parser that replays canned reports and hands back a canned unit.
pub struct FixtureParser {
    pub unit: Option<CompUnit>,
    pub reports: Vec<Report>,
}

impl Parser for FixtureParser {
    fn parse(&self, _filename: &str, _source: &str, reporter: &mut Reporter) -> Option<CompUnit> {
        for report in &self.reports {
            reporter.report(report.clone());
        }
        self.unit.clone()
    }
}

/// A parser that trips an internal failure.
pub struct PanickingParser;

impl Parser for PanickingParser {
    fn parse(&self, _filename: &str, _source: &str, _reporter: &mut Reporter) -> Option<CompUnit> {
        panic!("lexer exploded")
    }
}

/// A resolver that fails every lookup and records the packages it was told
/// about.
#[derive(Default)]
pub struct FailingResolver {
    pub packages: Vec<Vec<String>>,
}

impl ModuleResolver for FailingResolver {
    fn resolve(&mut self, descriptor: &ModuleDescriptor) -> Result<CompUnit, ImportError> {
        Err(ImportError::NotFound(format!(
            "no such module: {}",
            descriptor
        )))
    }

    fn set_current_package(&mut self, package: &[String]) {
        self.packages.push(package.to_vec());
    }
}
