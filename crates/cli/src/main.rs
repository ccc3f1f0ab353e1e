fn main() {
    if let Err(err) = jscope_cli::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
