use std::fmt;

use crate::location::Span;

/// Index of a syntax form in the grammar table.
pub type SyntaxId = usize;

/// Index of a judgment form in the grammar table.
pub type JudgmentId = usize;

/// Index of a constructor in the grammar table.
pub type ConstructorId = usize;

/// What a clause constructs: a syntactic category or a judgment.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum FormId {
    Syntax(SyntaxId),
    Judgment(JudgmentId),
}

/// An element as it comes out of the parser, before the grammar has been
/// consulted. Nonterminal and variable names are still strings; nested
/// clauses are unresolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceElement {
    /// A literal token.
    Terminal { text: String, span: Span },
    /// A reference to a syntactic category, like t or t1 or t'.
    NonTerminal { name: String, span: Span },
    /// An object-language variable, like x.
    Variable { name: String, span: Span },
    /// A nonterminal applied to locally-bound variables, like t2[x].
    Binding {
        name: String,
        args: Vec<SourceElement>,
        span: Span,
    },
    /// A nested clause.
    Clause(SourceClause),
}

impl SourceElement {
    pub fn span(&self) -> &Span {
        match self {
            SourceElement::Terminal { span, .. }
            | SourceElement::NonTerminal { span, .. }
            | SourceElement::Variable { span, .. }
            | SourceElement::Binding { span, .. } => span,
            SourceElement::Clause(c) => &c.span,
        }
    }
}

/// A clause as it comes out of the parser: just an ordered element sequence
/// with a location. Resolution against the grammar turns it into a
/// `ClauseUse`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceClause {
    pub elements: Vec<SourceElement>,
    pub span: Span,
}

impl fmt::Display for SourceClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, e) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match e {
                SourceElement::Terminal { text, .. } => write!(f, "{}", text)?,
                SourceElement::NonTerminal { name, .. } => write!(f, "{}", name)?,
                SourceElement::Variable { name, .. } => write!(f, "{}", name)?,
                SourceElement::Binding { name, args, .. } => {
                    write!(f, "{}[", name)?;
                    for (j, arg) in args.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        match arg {
                            SourceElement::Variable { name, .. } => write!(f, "{}", name)?,
                            other => write!(f, "{:?}", other)?,
                        }
                    }
                    write!(f, "]")?;
                }
                SourceElement::Clause(c) => write!(f, "({})", c)?,
            }
        }
        Ok(())
    }
}

/// A resolved element. The closed union the elaborator dispatches over;
/// both declared constructor shapes and use sites are made of these.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Element {
    Terminal(Terminal),
    NonTerminal(NonTerminal),
    Variable(Variable),
    Binding(Binding),
    Clause(ClauseUse),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Terminal {
    pub text: String,
    pub span: Span,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NonTerminal {
    pub name: String,
    pub syntax: SyntaxId,
    pub span: Span,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variable {
    pub name: String,
    pub syntax: SyntaxId,
    pub span: Span,
}

/// A nonterminal applied to bound variables. In a declared constructor shape
/// the args are the `Variable` elements that this position binds; at a use
/// site they are the locally-scoped variables being referenced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Binding {
    pub name: String,
    pub syntax: SyntaxId,
    pub args: Vec<Element>,
    pub span: Span,
}

/// A clause usage with its constructor resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClauseUse {
    pub constructor: ConstructorId,
    pub form: FormId,
    pub elements: Vec<Element>,
    pub span: Span,
}

impl Element {
    pub fn span(&self) -> &Span {
        match self {
            Element::Terminal(t) => &t.span,
            Element::NonTerminal(nt) => &nt.span,
            Element::Variable(v) => &v.span,
            Element::Binding(b) => &b.span,
            Element::Clause(c) => &c.span,
        }
    }
}

/// The signature key a single element contributes when looking up which
/// constructor a clause instantiates. Terminals match on their text;
/// everything else matches on the syntactic category it belongs to.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ElemKey {
    Terminal(String),
    Form(SyntaxId),
}

/// Strip a trailing index from a nonterminal or variable name: t1, t27 and
/// t' all refer to the category t.
pub fn base_name(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '\'')
}
