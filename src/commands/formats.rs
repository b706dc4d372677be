use crate::detector::Detector;
use crate::error::PtxError;
use colored::Colorize;

/// List registered parser formats in detection tie-break order.
pub fn run_formats() -> Result<(), PtxError> {
    let detector = Detector::new();
    for name in detector.format_names() {
        println!("{}", name);
    }
    // Available when configured with a pattern, never auto-detected.
    println!("{} {}", "regex".normal(), "(user-defined pattern)".dimmed());
    Ok(())
}
