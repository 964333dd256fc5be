use serde::{Deserialize, Serialize};

/// How a block whose name is neither a helper nor a builtin is rendered
/// outside strict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownBlock {
    /// Like `if`: body when the subject is truthy, else-body otherwise.
    #[default]
    Truthy,
    /// Mustache sections: iterate lists, narrow into maps, otherwise like `Truthy`.
    Section,
    /// Render nothing.
    Skip,
}

/// Options of a render call. Cheap to copy; several may be used against the
/// same registry at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Unknown helpers and partials raise instead of rendering as empty.
    pub strict: bool,
    pub unknown_block: UnknownBlock,
    /// Maximum number of nested partial expansions.
    pub max_depth: usize,
    /// Maximum number of node lists (template bodies, block bodies, partials)
    /// rendering inside each other, summed over all partial levels.
    pub max_nesting: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_MAX_NESTING: usize = 512;

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strict: false,
            unknown_block: UnknownBlock::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }
}

impl RenderConfig {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn with_unknown_block(mut self, unknown_block: UnknownBlock) -> Self {
        self.unknown_block = unknown_block;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }
}
