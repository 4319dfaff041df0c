fn main() {
    if let Err(err) = landing_quality::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
