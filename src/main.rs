use std::env;
use std::process;

use bitfetch::engine;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if let Err(e) = engine::run(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
