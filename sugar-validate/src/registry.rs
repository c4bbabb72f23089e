//! The macro registry: built-in SugarCube macros, macros declared in the
//! user script, caller overrides and widgets.

use std::collections::BTreeMap;

use crate::cursor::excerpt;
use crate::error::OverrideError;
use crate::extract;
use crate::report::{Message, Report, USER_SCRIPT_KEY};
use crate::script_macros::{self, Declaration, Scan};
use crate::types::{MacroDescriptor, SubtagContext};

/// Caller-supplied descriptors for macros the validator cannot discover.
pub type MacroOverrides = BTreeMap<String, MacroDescriptor>;

const CLOSED: &[&str] = &[
    "capture", "click", "do", "done", "script", "nobr", "silent", "silently", "type", "button",
    "link", "linkappend", "linkprepend", "linkreplace", "append", "prepend", "replace", "widget",
];

const COMPLEX: &[(&str, &[&str], bool)] = &[
    ("if", &["elseif", "else"], true),
    ("switch", &["case", "default"], true),
    ("for", &["break", "continue"], false),
    ("repeat", &["stop"], false),
    ("cycle", &["option", "optionsfrom"], false),
    ("listbox", &["option", "optionsfrom"], false),
    ("timed", &["next"], false),
    ("createaudiogroup", &["track"], false),
    ("createplaylist", &["track"], false),
];

const UNCLOSED: &[&str] = &[
    "set", "unset", "run", "=", "-", "include", "print", "checkbox", "radiobutton", "textarea",
    "textbox", "numberbox", "actions", "back", "choice", "return", "addclass", "copy", "remove",
    "removeclass", "toggleclass", "audio", "cacheaudio", "playlist", "masteraudio",
    "removeplaylist", "waitforaudio", "removeaudiogroup", "redo", "goto", "display", "forget",
    "remember", "setplaylist", "stopallaudio",
];

const DEPRECATED_ENDS: &[&str] = &[
    "endclick", "endif", "endfor", "endnobr", "endscript", "endsilently", "endbutton",
    "endappend", "endprepend", "endreplace", "endwidget",
];

/// Parse a JSON override table such as `{"say": {"closed": true}}`.
///
/// Descriptor names default to their map key.
pub fn parse_overrides(json: &str) -> Result<MacroOverrides, OverrideError> {
    normalize_overrides(serde_json::from_str(json)?)
}

/// Check an already deserialized override table and fill in missing names.
pub fn normalize_overrides(mut table: MacroOverrides) -> Result<MacroOverrides, OverrideError> {
    for (name, descriptor) in &mut table {
        if descriptor.contexts.iter().any(|ctx| ctx.parent.is_empty()) {
            return Err(OverrideError::EmptyParent { name: name.clone() });
        }
        if descriptor.name.is_empty() {
            descriptor.name = name.clone();
        }
    }
    Ok(table)
}

/// Name → descriptor lookup. Lookups are exact and case-sensitive; the
/// first definition of a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    macros: BTreeMap<String, MacroDescriptor>,
    custom_macros: usize,
    widgets: usize,
}

impl Registry {
    /// The SugarCube built-ins.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for name in CLOSED {
            registry.define(MacroDescriptor::simple(name, true));
        }
        for (name, subs, ordered) in COMPLEX {
            registry.define_complex(name, subs, *ordered);
        }
        for name in UNCLOSED {
            registry.define(MacroDescriptor::simple(name, false));
        }
        for name in DEPRECATED_ENDS {
            let replaces = name.strip_prefix("end").unwrap_or(name);
            registry.define(MacroDescriptor::deprecated_end(name, replaces));
        }
        registry
    }

    /// Built-ins plus user-script declarations plus caller overrides.
    ///
    /// Widgets are added later, per passage, through [`Registry::define_widget`].
    pub fn discover(document: &str, overrides: &MacroOverrides, report: &mut Report) -> Self {
        let mut registry = Self::builtin();

        if let Some((script_start, script)) = extract::user_script(document) {
            let scans = script_macros::scan_modern(script)
                .into_iter()
                .chain(script_macros::scan_legacy(script));
            for scan in scans {
                registry.register_scan(document, script_start, scan, report);
            }
        }

        for (name, descriptor) in overrides {
            if !registry.contains(name) {
                let mut descriptor = descriptor.clone();
                descriptor.name.clone_from(name);
                registry.macros.insert(name.clone(), descriptor);
            }
        }

        log::debug!(
            "registry: {} macros ({} from the user script, {} overrides)",
            registry.len(),
            registry.custom_macros,
            overrides.len()
        );
        registry
    }

    fn register_scan(&mut self, document: &str, script_start: usize, scan: Scan, report: &mut Report) {
        match scan {
            Scan::Declared(Declaration {
                names,
                tags,
                offset,
            }) => {
                let at = excerpt(document, script_start + offset);
                for name in names {
                    let defined = match &tags {
                        Some(tags) if !tags.is_empty() => self.define_complex(&name, tags, false),
                        Some(_) => self.define(MacroDescriptor::simple(&name, true)),
                        None => self.define(MacroDescriptor::simple(&name, false)),
                    };
                    if defined {
                        self.custom_macros += 1;
                        log::trace!("user script declares <<{name}>>");
                    } else {
                        report.add_warning(
                            USER_SCRIPT_KEY,
                            Message::new("Custom macro conflict with '$$1' at $$2")
                                .arg(&name)
                                .arg(at),
                        );
                    }
                }
            }
            Scan::Unresolved { offset } => {
                report.unresolved_macros = true;
                report.add_warning(
                    USER_SCRIPT_KEY,
                    Message::new("Could not evaluate macro at $$1")
                        .arg(excerpt(document, script_start + offset)),
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MacroDescriptor> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MacroDescriptor)> {
        self.macros.iter().map(|(name, d)| (name.as_str(), d))
    }

    /// Number of macros declared in the user script.
    pub fn custom_macros(&self) -> usize {
        self.custom_macros
    }

    /// Number of widgets registered from widget passages.
    pub fn widgets(&self) -> usize {
        self.widgets
    }

    /// Insert `descriptor` unless its name is already taken.
    pub fn define(&mut self, descriptor: MacroDescriptor) -> bool {
        if self.contains(&descriptor.name) {
            return false;
        }
        self.macros.insert(descriptor.name.clone(), descriptor);
        true
    }

    /// Register a widget; `false` if the name is taken.
    pub fn define_widget(&mut self, name: &str, container: bool) -> bool {
        let defined = self.define(MacroDescriptor::simple(name, container));
        if defined {
            self.widgets += 1;
        }
        defined
    }

    /// Register a closed macro whose `subs` continue it. The last sub-tag
    /// moves the parent into its terminal stage. Sub-tags shared by several
    /// parents accumulate one context per parent.
    fn define_complex<S: AsRef<str>>(&mut self, name: &str, subs: &[S], ordered: bool) -> bool {
        if !self.define(MacroDescriptor::simple(name, true)) {
            return false;
        }
        for (i, sub) in subs.iter().enumerate() {
            let sub = sub.as_ref();
            let context = SubtagContext {
                parent: name.to_string(),
                ordered,
                last: i + 1 == subs.len(),
            };
            self.macros
                .entry(sub.to_string())
                .or_insert_with(|| MacroDescriptor::simple(sub, false))
                .contexts
                .push(context);
        }
        true
    }

    /// Descriptors as a JSON-ready map, for building override tables.
    pub fn to_overrides(&self) -> MacroOverrides {
        self.macros.clone()
    }
}
