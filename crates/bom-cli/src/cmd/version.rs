//! Version command

/// Print the crate version
pub fn version() {
    println!("bom-mgmt {}", env!("CARGO_PKG_VERSION"));
}
