use serde::{Deserialize, Serialize};

/// What to do with an access whose array capacity cannot be traced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedSizePolicy {
    /// Stop the pass and report the error
    #[default]
    Halt,
    /// Leave the access uninstrumented, warn, and count it
    SkipSite,
}

/// Configuration for the bounds-check instrumentation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundsCheckConfig {
    /// Symbol of the runtime check function, called as `(offset: i32, capacity: i32)`
    pub check_function: String,

    /// Name of the process-entry function whose `(count, args)` parameters are left as is
    pub entry_function: String,

    /// Handling of accesses whose capacity cannot be determined
    pub on_unresolved_size: UnresolvedSizePolicy,

    /// Verify the module after instrumentation
    pub verify_after: bool,
}

impl Default for BoundsCheckConfig {
    fn default() -> Self {
        Self {
            check_function: coco_runtime::CHECK_BOUNDS_SYMBOL.to_string(),
            entry_function: "main".to_string(),
            on_unresolved_size: UnresolvedSizePolicy::Halt,
            verify_after: cfg!(debug_assertions),
        }
    }
}

impl BoundsCheckConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Render this configuration as pretty-printed JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn with_check_function(mut self, name: impl Into<String>) -> Self {
        self.check_function = name.into();
        self
    }

    pub fn with_entry_function(mut self, name: impl Into<String>) -> Self {
        self.entry_function = name.into();
        self
    }

    pub fn with_unresolved_size_policy(mut self, policy: UnresolvedSizePolicy) -> Self {
        self.on_unresolved_size = policy;
        self
    }

    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_after = enabled;
        self
    }
}
