use serde::{Deserialize, Serialize};
use std::fmt;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};

use crate::location::Span;

/// How bad a report is. There is no "info" level: everything the checker has
/// to say is either wrong or suspicious.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// The closed enumeration of report kinds. Each kind carries a fixed
/// severity and a fixed nominal phase; a report of a parse kind showing up
/// after the parse cut (or vice versa) indicates a defect in the checker
/// itself, which `Analysis::phase_anomalies` surfaces.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ReportKind {
    /// The parser expected a specific token.
    ParseExpected,
    /// The parser failed without a single expected token to suggest.
    ParseError,
    /// The lexer could not form a token.
    LexicalError,
    /// An unexpected failure inside the checker, downgraded to a report so
    /// the rest of the batch can still run.
    InternalError,
    /// A case analysis assumed a variable of a form that has no registered
    /// assumption rule to justify it.
    MissingAssumptionRule,
    /// A declared bound position was filled by something other than a
    /// variable.
    ExpectedVariable,
    /// An assumption clause has more than one nested assumption list, or
    /// more than one bare variable.
    AmbiguousAssumption,
    /// No grammar constructor or judgment matches the clause's elements.
    NoMatchingConstructor,
    /// A judgment appeared nested inside a clause.
    JudgmentInClause,
    /// A synthesized derivation could not be adapted to the expected shape.
    DerivationShapeMismatch,
    /// A derivation was stated but never proved.
    DerivationUnproved,
    /// A case is missing its "where" substitution information.
    WhereMissing,
    /// Anything without a more specific kind.
    Unspecified,
}

impl ReportKind {
    /// The fixed severity of this kind.
    pub fn severity(self) -> Severity {
        match self {
            ReportKind::DerivationUnproved | ReportKind::WhereMissing => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Whether this kind nominally belongs to the parse phase.
    pub fn is_parse_kind(self) -> bool {
        matches!(
            self,
            ReportKind::ParseExpected | ReportKind::ParseError | ReportKind::LexicalError
        )
    }

    /// Whether this kind can legitimately occur in either phase, exempting
    /// it from the phase self-check.
    pub fn is_phase_neutral(self) -> bool {
        matches!(self, ReportKind::InternalError | ReportKind::Unspecified)
    }

    /// A stable identifier for tooling.
    pub fn code(self) -> &'static str {
        match self {
            ReportKind::ParseExpected => "parse-expected-token",
            ReportKind::ParseError => "parse-error",
            ReportKind::LexicalError => "lexical-error",
            ReportKind::InternalError => "internal-error",
            ReportKind::MissingAssumptionRule => "missing-assumption-rule",
            ReportKind::ExpectedVariable => "expected-variable",
            ReportKind::AmbiguousAssumption => "ambiguous-assumption",
            ReportKind::NoMatchingConstructor => "no-matching-constructor",
            ReportKind::JudgmentInClause => "judgment-in-clause",
            ReportKind::DerivationShapeMismatch => "derivation-shape-mismatch",
            ReportKind::DerivationUnproved => "derivation-unproved",
            ReportKind::WhereMissing => "where-missing",
            ReportKind::Unspecified => "unspecified",
        }
    }
}

/// One diagnostic produced while processing a unit.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub kind: ReportKind,
    pub severity: Severity,
    pub message: String,
    pub extra: Option<String>,
    pub span: Span,
}

impl Report {
    pub fn new(kind: ReportKind, span: Span, message: String) -> Report {
        Report {
            kind,
            severity: kind.severity(),
            message,
            extra: None,
            span,
        }
    }

    pub fn with_extra(kind: ReportKind, span: Span, message: String, extra: String) -> Report {
        Report {
            kind,
            severity: kind.severity(),
            message,
            extra: Some(extra),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Convert to an LSP diagnostic for editor surfaces.
    pub fn lsp_diagnostic(&self) -> Diagnostic {
        let severity = match self.severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
        };
        Diagnostic {
            range: self.span.lsp_range(),
            severity: Some(severity),
            code: Some(NumberOrString::String(self.kind.code().to_string())),
            message: self.message.clone(),
            ..Diagnostic::default()
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", self.span, label, self.message)?;
        if let Some(extra) = &self.extra {
            write!(f, " ({})", extra)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_severities_are_fixed() {
        assert_eq!(ReportKind::MissingAssumptionRule.severity(), Severity::Error);
        assert_eq!(ReportKind::DerivationUnproved.severity(), Severity::Warning);
        assert_eq!(ReportKind::WhereMissing.severity(), Severity::Warning);
    }

    #[test]
    fn test_parse_kinds() {
        assert!(ReportKind::LexicalError.is_parse_kind());
        assert!(ReportKind::ParseExpected.is_parse_kind());
        assert!(!ReportKind::MissingAssumptionRule.is_parse_kind());
        assert!(ReportKind::InternalError.is_phase_neutral());
    }

    #[test]
    fn test_lsp_diagnostic_conversion() {
        let report = Report::new(
            ReportKind::ExpectedVariable,
            Span::point("main.lrc", 3, 7),
            "expected a variable".to_string(),
        );
        let diag = report.lsp_diagnostic();
        assert_eq!(diag.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diag.range.start.line, 2);
        assert_eq!(diag.range.start.character, 6);
        assert_eq!(
            diag.code,
            Some(NumberOrString::String("expected-variable".to_string()))
        );
    }

    #[test]
    fn test_report_serialization() {
        let report = Report::with_extra(
            ReportKind::InternalError,
            Span::file_start("main.lrc"),
            "internal error during checking".to_string(),
            "index out of bounds".to_string(),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "InternalError");
        assert_eq!(json["extra"], "index out of bounds");
    }
}
