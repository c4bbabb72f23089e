//! WASM bindings for `sugar-validate`.
//!
//! Exposes the validator to JavaScript via wasm-bindgen. `validate()`
//! returns the full report as JSON; `render_messages()` returns display
//! lines for hosts that only need text.

use sugar_validate::{MacroOverrides, Report};
use wasm_bindgen::prelude::*;

fn run(input: &str, overrides: &MacroOverrides) -> Report {
    sugar_validate::validate(input, overrides)
        .unwrap_or_else(|err| Report::from_document_error(&err))
}

/// Validate a compiled story and return the report as JSON.
///
/// `overrides` is an optional object mapping macro names to descriptors,
/// e.g. `{ dialog: { closed: true } }`. The result has `errors`,
/// `warnings`, `infos`, `unresolvedMacros` and `unresolvedWidgets`.
/// Warnings are `[template, ...args]` arrays.
#[wasm_bindgen]
pub fn validate(input: &str, overrides: JsValue) -> Result<String, JsError> {
    let overrides: MacroOverrides = if overrides.is_undefined() || overrides.is_null() {
        MacroOverrides::new()
    } else {
        serde_wasm_bindgen::from_value(overrides)?
    };
    Ok(serde_json::to_string(&run(input, &overrides))?)
}

/// Validate with built-in and discovered macros only and return one
/// rendered line per diagnostic, as a JSON array of
/// `{ severity, key, message }` objects.
#[wasm_bindgen]
pub fn render_messages(input: &str) -> String {
    let diagnostics = run(input, &MacroOverrides::new()).diagnostics();
    serde_json::to_string(&diagnostics).unwrap_or_else(|_| "[]".to_string())
}
