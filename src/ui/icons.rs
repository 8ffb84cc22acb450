//! Shared UI icons.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");

// Lifecycle phases
pub static ENTER: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static EXIT: Emoji<'_, '_> = Emoji("◀️  ", "[<]");
pub static HOOK: Emoji<'_, '_> = Emoji("🔧 ", "[H]");
pub static TEST: Emoji<'_, '_> = Emoji("🧪 ", "[T]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
