//! The validation pipeline.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{DocumentError, PassageFault};
use crate::registry::{MacroOverrides, Registry};
use crate::report::{Report, STATISTICS};
use crate::types::Passage;
use crate::{balance, css, deprecated, expr, extract, links, matcher, widgets};

/// Validate a compiled story document.
///
/// Macros are known before any passage is checked: built-ins, user-script
/// declarations, `overrides` (only for names not already taken) and then
/// widgets. Each passage is checked independently; a fault in one passage
/// is recorded under its header and the run moves on. Only a malformed
/// story or passage container aborts the run.
pub fn validate(document: &str, overrides: &MacroOverrides) -> Result<Report, DocumentError> {
    let mut report = Report::default();
    let story = extract::extract_story(document, &mut report)?;
    log::debug!("extracted {} passages", story.passages.len());

    let mut registry = Registry::discover(document, overrides, &mut report);

    let mut failed = BTreeSet::new();
    for (index, passage) in story.passages.iter().enumerate() {
        if let Err(fault) = widgets::discover(passage, &mut registry, &mut report) {
            report.add_error(&passage.header, fault.message);
            failed.insert(index);
        }
    }

    for (index, passage) in story.passages.iter().enumerate() {
        if failed.contains(&index) {
            continue;
        }
        log::trace!("checking {}", passage.header);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            check_passage(passage, &registry, &mut report)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => report.add_error(&passage.header, fault.message),
            Err(payload) => report.add_error(
                &passage.header,
                format!("Unhandled exception: {}", panic_message(payload.as_ref())),
            ),
        }
    }

    links::check_links(&story, &mut report);
    deprecated::check_user_script(document, &mut report);
    css::check_stylesheet(document, &mut report);

    report.add_info(STATISTICS, format!("Passages: {}", story.passages.len()));
    report.add_info(STATISTICS, format!("Custom macros: {}", registry.custom_macros()));
    report.add_info(STATISTICS, format!("Widgets: {}", registry.widgets()));

    log::debug!(
        "validation done: {} errors, {} warnings",
        report.error_count(),
        report.warning_count()
    );
    Ok(report)
}

/// Every per-passage check, in order. The first fault ends the passage.
fn check_passage(passage: &Passage, registry: &Registry, report: &mut Report) -> Result<(), PassageFault> {
    balance::check_quote_parity(passage, report);
    balance::check_macro_brackets(passage)?;
    matcher::check_nesting(passage, registry, report)?;
    deprecated::check_passage(passage, report);
    expr::check_conditions(passage, report)?;
    expr::check_setters(passage, report);
    widgets::check_misplaced(passage, report);
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
