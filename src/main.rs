fn main() {
    if let Err(err) = ticket_report::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
