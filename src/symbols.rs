// Visual symbols and emoji constants used throughout the application
// Using generic names that represent meaning rather than the specific emoji

/// Status and feedback symbols
pub const SYMBOL_INDICATOR_SUCCESS: &str = "✅";
pub const SYMBOL_INDICATOR_ERROR: &str = "❌";
pub const SYMBOL_INDICATOR_WARNING: &str = "⚠️";
pub const SYMBOL_INDICATOR_INFO: &str = "📋";

/// Content and tool symbols
pub const SYMBOL_CONTENT_ARROW_RIGHT: &str = "→";
pub const SYMBOL_TOOL_CAPABILITY: &str = "🔌";
pub const SYMBOL_TOOL_CONFIG: &str = "🔧";

/// Scope symbols
pub const SYMBOL_SCOPE_TYPE: &str = "🏷️";
pub const SYMBOL_SCOPE_INSTANCE: &str = "📄";
