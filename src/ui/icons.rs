//! Emoji used across the terminal output, with plain fallbacks.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

pub static DISK: Emoji<'_, '_> = Emoji("💾 ", "[CP]");
pub static NOTE: Emoji<'_, '_> = Emoji("🎵 ", "[~]");
pub static SCORE: Emoji<'_, '_> = Emoji("🎼 ", "[#]");
pub static REVIEW: Emoji<'_, '_> = Emoji("🔍 ", "[R]");
pub static STOP: Emoji<'_, '_> = Emoji("✋ ", "[STOP]");
