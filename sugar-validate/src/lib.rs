//! `sugar-validate`: static checks for compiled SugarCube stories.
//!
//! Takes the HTML file that Twine 2 publishes for a SugarCube story and
//! reports unbalanced or misnested macros, suspicious expressions, broken
//! links, unreachable passages, deprecated APIs and duplicated stylesheet
//! rules. Nothing is executed: every check is a static heuristic over the
//! passage text.
//!
//! # Quick start
//!
//! ```
//! let html = r#"<tw-storydata name="Demo" startnode="1" ifid="D1">
//! <tw-passagedata pid="1" name="Start" tags="">&lt;&lt;if $ready&gt;&gt;[[Go]]&lt;&lt;/if&gt;&gt;</tw-passagedata>
//! <tw-passagedata pid="2" name="Go" tags="">Done.</tw-passagedata>
//! </tw-storydata>"#;
//!
//! let report = sugar_validate::validate(html, &Default::default()).unwrap();
//! assert!(report.is_clean());
//! assert_eq!(report.infos["Statistics"][0], "Passages: 2");
//! ```

pub mod balance;
pub mod css;
pub mod cursor;
pub mod deprecated;
pub mod error;
pub mod expr;
pub mod extract;
pub mod links;
pub mod matcher;
pub mod registry;
pub mod report;
pub mod script_macros;
pub mod types;
pub mod validate;
pub mod widgets;

pub use error::{DocumentError, OverrideError, PassageFault};
pub use registry::{MacroOverrides, Registry, normalize_overrides, parse_overrides};
pub use report::{Diagnostic, Message, Report, Severity};
pub use types::{MacroDescriptor, Passage, Story, SubtagContext};
pub use validate::validate;
