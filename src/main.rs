//! # Marching Terrain Entry Point
//!
//! Runs the headless sculpting session from the library.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

fn main() {
    if let Err(error) = marching_terrain::run() {
        log::error!("{error}");
        eprintln!("marching-terrain: {error}");
        std::process::exit(1);
    }
}
