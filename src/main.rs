fn main() {
    if let Err(err) = drift_compare::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
