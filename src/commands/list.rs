//! Listing commands

use crate::programmers;

/// Print the available programmer backends
pub fn list_programmers() {
    println!("Available programmers:");
    for p in programmers::available_programmers() {
        println!("  {:10} {}", p.name, p.description);
    }
}
