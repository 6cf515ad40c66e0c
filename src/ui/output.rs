//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::style;

/// Display a section header
pub fn section(_ctx: &UiContext, title: &str) {
    println!("{}", style(title).bold());
}

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        eprintln!("{} {} ({})", style("✓").green(), message, style(detail).dim());
    } else {
        eprintln!("  {} {} ({})", style("[OK]").green(), message, detail);
    }
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        eprintln!("{} {} - {}", style("!").yellow(), message, style(hint).dim());
    } else {
        eprintln!("  {} {} - {}", style("[WARN]").yellow(), message, hint);
    }
}

/// Display an aligned key/value line
pub fn key_value(_ctx: &UiContext, key: &str, value: &str) {
    println!("  {:<12} {}", style(key).dim(), value);
}
