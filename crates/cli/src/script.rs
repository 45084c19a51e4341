//! Replay scripts: a TOML list of timed listing-view events.
//!
//! ```toml
//! [[event]]
//! at_ms = 0
//! action = "type"
//! value = "lam"
//!
//! [[event]]
//! at_ms = 120
//! action = "page"
//! index = 1
//! size = 12
//! ```

use std::path::Path;

use serde::Deserialize;
use shopfront_core::{EngineResult, ListingEngine, SearchBox};

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default, rename = "event")]
    pub events: Vec<ScriptEvent>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptEvent {
    /// Offset from the start of the replay.
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    /// Keystroke into the header search box.
    Type { value: String },
    /// Enter pressed in the header search box.
    Submit,
    /// Clear the header search box.
    Clear,
    /// Live-as-you-type input on the listing page itself.
    Live { value: String },
    /// Explicit search-term change.
    Search { value: String },
    /// Category selection; omit `value` to clear it.
    Category { value: Option<i64> },
    /// Sort selection as `"field,dir"`.
    Sort { value: String },
    Page { index: usize, size: usize },
    Refresh,
}

impl Action {
    pub fn apply(&self, engine: &ListingEngine, search: &SearchBox) -> EngineResult<()> {
        match self {
            Action::Type { value } => search.input(value),
            Action::Submit => {
                search.submit();
            }
            Action::Clear => search.clear(),
            Action::Live { value } => engine.type_search(value)?,
            Action::Search { value } => {
                engine.set_search_term(value.as_str())?;
            }
            Action::Category { value } => {
                engine.set_category(*value)?;
            }
            Action::Sort { value } => {
                engine.set_sort_text(value)?;
            }
            Action::Page { index, size } => {
                engine.set_page(*index, *size)?;
            }
            Action::Refresh => {
                engine.refresh()?;
            }
        }
        Ok(())
    }
}

impl Script {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut script: Script = toml::from_str(content)?;
        script.events.sort_by_key(|e| e.at_ms);
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Could not read {}: {e}", path.display()))?;
        Ok(Self::parse(&content).map_err(|e| format!("Invalid script {}: {e}", path.display()))?)
    }

    /// Time at which the last event fires.
    pub fn duration_ms(&self) -> u64 {
        self.events.last().map_or(0, |e| e.at_ms)
    }
}
