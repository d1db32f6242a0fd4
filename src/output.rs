//! Console reporting. Normal progress lines go to stdout prefixed `-- `,
//! errors to stderr prefixed `ERROR -- `.

/// Writes a progress line to stdout.
pub fn progress(msg: &str) {
    println!("-- {msg}");
}

/// Writes an error line to stderr.
pub fn report_error(msg: &str) {
    eprintln!("ERROR -- {msg}");
}
