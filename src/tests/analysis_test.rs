use super::common::*;

use crate::diagnostics::analysis::{Analysis, ContractFault};
use crate::diagnostics::report::{Report, ReportKind, Severity};
use crate::location::Span;
use crate::module::ModuleDescriptor;

// This file tests the diagnostics pipeline: one run per session, the parse
// cut, cached counts, and recovery behavior.

fn parse_error() -> Report {
    Report::new(
        ReportKind::ParseExpected,
        Span::point("test.lrc", 2, 5),
        "expected \"=>\"".to_string(),
    )
}

#[test]
fn test_counts_partition_the_reports() {
    // One parse error from the parser, one unproved-theorem warning from
    // checking.
    let parser = FixtureParser {
        unit: Some(stlc_unit(true, vec![theorem("progress", vec![])])),
        reports: vec![parse_error()],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );

    assert_eq!(analysis.reports().len(), 2);
    assert_eq!(
        analysis.error_count() + analysis.warning_count(),
        analysis.reports().len()
    );
    assert_eq!(
        analysis.parse_reports().len() + analysis.after_parse_reports().len(),
        analysis.reports().len()
    );
    assert_eq!(analysis.parse_reports().len(), 1);
    assert_eq!(analysis.error_count(), 1);
    assert_eq!(analysis.warning_count(), 1);
    assert_eq!(
        analysis.after_parse_reports()[0].kind,
        ReportKind::DerivationUnproved
    );
    assert_eq!(analysis.after_parse_reports()[0].severity, Severity::Warning);
}

#[test]
fn test_run_twice_is_a_contract_fault_both_times() {
    let parser = FixtureParser {
        unit: Some(stlc_unit(true, vec![])),
        reports: vec![],
    };
    let mut analysis = Analysis::new("test.lrc", ModuleDescriptor::Anonymous);
    assert_eq!(analysis.run(&parser, None, ""), Ok(()));
    let count = analysis.reports().len();

    assert_eq!(
        analysis.run(&parser, None, ""),
        Err(ContractFault::AlreadyRun)
    );
    assert_eq!(
        analysis.run(&parser, None, ""),
        Err(ContractFault::AlreadyRun)
    );
    // No additional reports were recorded by the failed calls.
    assert_eq!(analysis.reports().len(), count);
}

#[test]
fn test_missing_assumption_rule_does_not_stop_checking() {
    // A case analysis assumes a variable of a form with no assumption
    // rule; the remaining steps are still checked.
    let steps = vec![
        var_case_clause(),
        clause(vec![term("fn"), term("fn")]),
        plain_judgment_clause(),
    ];
    let parser = FixtureParser {
        unit: Some(stlc_unit(false, vec![theorem("progress", steps)])),
        reports: vec![],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );

    let missing: Vec<_> = analysis
        .reports()
        .iter()
        .filter(|r| r.kind == ReportKind::MissingAssumptionRule)
        .collect();
    assert_eq!(missing.len(), 1);

    // The later steps were reached: the malformed one produced its own
    // report.
    let unmatched: Vec<_> = analysis
        .reports()
        .iter()
        .filter(|r| r.kind == ReportKind::NoMatchingConstructor)
        .collect();
    assert_eq!(unmatched.len(), 1);
    assert!(analysis.parse_reports().is_empty());
}

#[test]
fn test_full_unit_with_var_rule_is_clean() {
    let steps = vec![plain_judgment_clause(), var_case_clause()];
    let parser = FixtureParser {
        unit: Some(stlc_unit(true, vec![theorem("progress", steps)])),
        reports: vec![],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );
    assert!(analysis.reports().is_empty());
    assert_eq!(analysis.error_count(), 0);
    assert_eq!(analysis.warning_count(), 0);
    assert!(analysis.unit().is_some());
}

#[test]
fn test_no_syntax_tree_keeps_its_parse_error() {
    let parser = FixtureParser {
        unit: None,
        reports: vec![Report::new(
            ReportKind::LexicalError,
            Span::point("test.lrc", 1, 3),
            "stray control character".to_string(),
        )],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );
    assert!(analysis.unit().is_none());
    assert_eq!(analysis.parse_reports().len(), 1);
    assert!(analysis.after_parse_reports().is_empty());
    assert!(analysis.parse_reports()[0].is_error());
}

#[test]
fn test_no_syntax_tree_without_error_is_itself_reported() {
    // The sanity invariant: a parser that silently fails gets an internal
    // error recorded among the parse reports.
    let parser = FixtureParser {
        unit: None,
        reports: vec![],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );
    assert_eq!(analysis.parse_reports().len(), 1);
    assert_eq!(analysis.parse_reports()[0].kind, ReportKind::InternalError);
}

#[test]
fn test_parser_panic_is_downgraded_to_internal_error() {
    let analysis = Analysis::parse_and_check(
        &PanickingParser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );
    assert!(analysis.unit().is_none());
    assert_eq!(analysis.parse_reports().len(), 1);
    let report = &analysis.parse_reports()[0];
    assert_eq!(report.kind, ReportKind::InternalError);
    assert_eq!(report.extra.as_deref(), Some("lexer exploded"));
}

#[test]
fn test_phase_anomalies_flag_misplaced_kinds() {
    // A buggy parser emitting a check-phase kind during parsing is exactly
    // what the self-check exists to catch.
    let parser = FixtureParser {
        unit: Some(stlc_unit(true, vec![])),
        reports: vec![Report::new(
            ReportKind::MissingAssumptionRule,
            Span::point("test.lrc", 1, 1),
            "misplaced".to_string(),
        )],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );
    assert_eq!(analysis.phase_anomalies().len(), 1);
}

#[test]
fn test_clean_run_has_no_phase_anomalies() {
    let parser = FixtureParser {
        unit: Some(stlc_unit(false, vec![theorem("progress", vec![var_case_clause()])])),
        reports: vec![parse_error()],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );
    assert!(analysis.reports().len() >= 2);
    assert!(analysis.phase_anomalies().is_empty());
}

#[test]
fn test_unresolvable_module_is_a_single_report() {
    let mut unit = stlc_unit(true, vec![]);
    unit.declarations.push(module_part("lib.naturals"));
    let parser = FixtureParser {
        unit: Some(unit),
        reports: vec![],
    };
    let mut resolver = FailingResolver::default();
    let analysis = Analysis::parse_and_check(
        &parser,
        Some(&mut resolver),
        "test.lrc",
        ModuleDescriptor::name("lib.main"),
        "",
    );
    assert_eq!(analysis.error_count(), 1);
    let report = &analysis.after_parse_reports()[0];
    assert_eq!(report.kind, ReportKind::Unspecified);
    assert!(report.message.contains("lib.naturals"));
    // The resolver was told the enclosing package before resolving.
    assert_eq!(resolver.packages, vec![vec!["lib".to_string()]]);
}

#[test]
fn test_module_without_resolver_is_reported() {
    let mut unit = stlc_unit(true, vec![]);
    unit.declarations.push(module_part("lib.naturals"));
    let parser = FixtureParser {
        unit: Some(unit),
        reports: vec![],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "test.lrc",
        ModuleDescriptor::Anonymous,
        "",
    );
    assert_eq!(analysis.error_count(), 1);
    assert!(analysis.after_parse_reports()[0]
        .message
        .contains("no resolver"));
}

#[test]
fn test_accessors_describe_the_session() {
    let parser = FixtureParser {
        unit: Some(stlc_unit(true, vec![])),
        reports: vec![],
    };
    let analysis = Analysis::parse_and_check(
        &parser,
        None,
        "units/test.lrc",
        ModuleDescriptor::name("lib.test"),
        "",
    );
    assert_eq!(analysis.filename(), "units/test.lrc");
    assert_eq!(analysis.module(), &ModuleDescriptor::name("lib.test"));
    let unit = analysis.unit().unwrap();
    assert_eq!(unit.syntaxes().count(), 3);
    assert_eq!(unit.judgments().count(), 1);
    assert_eq!(unit.theorems().count(), 0);
}

#[test]
#[should_panic(expected = "has not been run yet")]
fn test_reading_an_unfinished_session_is_a_fault() {
    let analysis = Analysis::new("test.lrc", ModuleDescriptor::Anonymous);
    let _ = analysis.reports();
}
