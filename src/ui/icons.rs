//! Shared UI icons and emojis.

use console::Emoji;

// Step status
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static PENDING: Emoji<'_, '_> = Emoji("⏳ ", "[..]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// File tree
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static FILE: Emoji<'_, '_> = Emoji("📄 ", "");

// Session
pub static BOX: Emoji<'_, '_> = Emoji("📦 ", "[BOX]");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "[URL]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
