//! Loads the full-detail geometry of every leaf chunk, the way an authoritative server would before simulating collisions.
//!
//! ```text
//! strata-preload <config.ron>
//! ```

use strata::{Config, Error};

use std::process;
use std::time::Instant;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: strata-preload <config.ron>");
            process::exit(2);
        }
    };

    if let Err(e) = run(&path) {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn run(config_path: &str) -> Result<(), Error> {
    let config = Config::read_file(config_path)?;
    match &config.chunk_file {
        Some(path) => log::info!("Streaming from {}", path.display()),
        None => log::info!(
            "No chunk file configured; generating a depth {} procedural terrain",
            config.procedural.tree_depth
        ),
    }

    let mut cache = config.open_cache()?;
    cache.inc_ownership();

    let start = Instant::now();
    let result = cache.load_server_info();
    let elapsed = start.elapsed();

    log::info!(
        "Preloading {} leaf chunks took {:.2?}",
        cache.tree().leaves().count(),
        elapsed
    );
    log::info!("{}", cache.stats());

    cache.dec_ownership();
    Ok(result?)
}
