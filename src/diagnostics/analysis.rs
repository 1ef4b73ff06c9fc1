use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::diagnostics::report::{Report, ReportKind};
use crate::diagnostics::reporter::CheckContext;
use crate::location::Span;
use crate::module::{ModuleDescriptor, ModuleResolver};
use crate::unit::{CompUnit, Parser};

/// Misuse of the library itself: a violated usage contract, not a
/// diagnostic about the user's proof. Kept strictly separate from the
/// recoverable report channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContractFault {
    /// `run` was called on a session whose results are already determined.
    AlreadyRun,
}

impl fmt::Display for ContractFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContractFault::AlreadyRun => {
                write!(f, "results for this session are already determined")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Unparsed,
    Parsing,
    Checking,
    Finalized,
}

/// The results of parsing and checking one source unit.
///
/// A session is created per unit, populated by exactly one `run`, and then
/// frozen: the report sequence, the parse cut, and the cached severity
/// counts never change afterwards. Each session owns its own fresh-variable
/// supply and report sink, so independent units can be processed in any
/// order, or concurrently, with identical results.
pub struct Analysis {
    filename: String,
    module: ModuleDescriptor,
    state: State,
    unit: Option<CompUnit>,
    reports: Vec<Report>,
    parse_cut: usize,
    errors: usize,
    warnings: usize,
}

impl Analysis {
    pub fn new(filename: &str, module: ModuleDescriptor) -> Analysis {
        Analysis {
            filename: filename.to_string(),
            module,
            state: State::Unparsed,
            unit: None,
            reports: Vec::new(),
            parse_cut: 0,
            errors: 0,
            warnings: 0,
        }
    }

    /// Parse and check in one call; for callers that don't need to hold an
    /// unfinished session.
    pub fn parse_and_check(
        parser: &dyn Parser,
        resolver: Option<&mut dyn ModuleResolver>,
        filename: &str,
        module: ModuleDescriptor,
        source: &str,
    ) -> Analysis {
        let mut analysis = Analysis::new(filename, module);
        analysis
            .run(parser, resolver, source)
            .expect("a fresh session cannot have run already");
        analysis
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn module(&self) -> &ModuleDescriptor {
        &self.module
    }

    /// Analyze the unit and freeze the results. Populates the report
    /// sequence exactly once; calling this a second time is a contract
    /// fault and records nothing.
    ///
    /// A panic in either phase is downgraded to a recoverable
    /// `INTERNAL_ERROR` report carrying the cause, so a batch of units can
    /// all be processed even when one of them trips a defect in the checker.
    pub fn run(
        &mut self,
        parser: &dyn Parser,
        mut resolver: Option<&mut dyn ModuleResolver>,
        source: &str,
    ) -> Result<(), ContractFault> {
        if self.state != State::Unparsed {
            return Err(ContractFault::AlreadyRun);
        }

        // The context is created here and nowhere else: the fresh-variable
        // numbering restarts for every unit.
        let mut ctx = CheckContext::new();

        self.state = State::Parsing;
        let parsed = {
            let reporter = &mut ctx.reporter;
            catch_unwind(AssertUnwindSafe(|| {
                parser.parse(&self.filename, source, reporter)
            }))
        };
        let unit = match parsed {
            Ok(unit) => unit,
            Err(cause) => {
                ctx.reporter.report(Report::with_extra(
                    ReportKind::InternalError,
                    Span::file_start(&self.filename),
                    "internal error during parsing".to_string(),
                    panic_message(cause),
                ));
                None
            }
        };

        // Sanity invariant: no syntax tree means some parse report said why.
        if unit.is_none() && !ctx.reporter.has_parse_error() {
            ctx.reporter.report(Report::new(
                ReportKind::InternalError,
                Span::file_start(&self.filename),
                "parser produced no syntax tree and no error".to_string(),
            ));
        }
        ctx.reporter.mark_parse_cut();

        self.state = State::Checking;
        if let Some(unit) = &unit {
            if let Some(r) = resolver.as_mut() {
                r.set_current_package(self.module.package());
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| unit.check(resolver, &mut ctx)));
            if let Err(cause) = outcome {
                ctx.reporter.report(Report::with_extra(
                    ReportKind::InternalError,
                    Span::file_start(&self.filename),
                    "internal error during checking".to_string(),
                    panic_message(cause),
                ));
            }
        }

        let (reports, parse_cut) = ctx.reporter.into_reports();
        self.errors = reports.iter().filter(|r| r.is_error()).count();
        self.warnings = reports.len() - self.errors;
        self.parse_cut = parse_cut;
        self.reports = reports;
        self.unit = unit;
        self.state = State::Finalized;
        Ok(())
    }

    fn require_finalized(&self) {
        if self.state != State::Finalized {
            panic!("analysis of {} has not been run yet", self.filename);
        }
    }

    /// The syntax tree, if parsing produced one.
    pub fn unit(&self) -> Option<&CompUnit> {
        self.require_finalized();
        self.unit.as_ref()
    }

    /// All reports, in the order they occurred.
    pub fn reports(&self) -> &[Report] {
        self.require_finalized();
        &self.reports
    }

    /// The reports that occurred during parsing.
    pub fn parse_reports(&self) -> &[Report] {
        self.require_finalized();
        &self.reports[..self.parse_cut]
    }

    /// The reports that occurred after parsing was over.
    pub fn after_parse_reports(&self) -> &[Report] {
        self.require_finalized();
        &self.reports[self.parse_cut..]
    }

    /// The number of error-severity reports. Computed once at finalization.
    pub fn error_count(&self) -> usize {
        self.require_finalized();
        self.errors
    }

    /// The number of warning-severity reports. Computed once at
    /// finalization.
    pub fn warning_count(&self) -> usize {
        self.require_finalized();
        self.warnings
    }

    /// Self-check: reports whose actual phase disagrees with their kind's
    /// nominal classification. Anything returned here points at a defect in
    /// the checker, not in the user's proof. Phase-neutral kinds (internal
    /// errors) are exempt.
    pub fn phase_anomalies(&self) -> Vec<&Report> {
        self.require_finalized();
        self.reports
            .iter()
            .enumerate()
            .filter(|(i, r)| {
                !r.kind.is_phase_neutral() && r.kind.is_parse_kind() != (*i < self.parse_cut)
            })
            .map(|(_, r)| r)
            .collect()
    }
}

fn panic_message(cause: Box<dyn Any + Send>) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
