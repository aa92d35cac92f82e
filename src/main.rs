use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let filter = brisk::cli::default_log_filter(&args);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .init();

    if let Err(e) = brisk::cli::run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
