use serde::{Deserialize, Serialize};

/// How `&&`/`||`/`??` branches count toward branch totals in summaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportLogic {
    /// Every operand is its own branch path.
    #[default]
    Off,
    /// A chain counts as one branch, covered when any operand ran.
    Or,
    /// A chain counts as one branch, covered when every operand ran.
    And,
}

/// What to do with an ignore comment that matches nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DirectivePolicy {
    #[default]
    Error,
    Warn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvertOptions {
    /// Method names or glob patterns whose bodies are excluded.
    pub ignore_class_methods: Vec<String>,
    /// Drop every file under a `node_modules` directory.
    pub ignore_node_modules: bool,
    pub report_logic: ReportLogic,
    /// Length of the CommonJS wrapper V8 saw in front of the source.
    pub wrapper_length: u32,
    pub unresolved_directives: DirectivePolicy,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            ignore_class_methods: Vec::new(),
            ignore_node_modules: true,
            report_logic: ReportLogic::Off,
            wrapper_length: 0,
            unresolved_directives: DirectivePolicy::Error,
        }
    }
}
