use std::process::ExitCode;

mod app;
mod logging;

fn main() -> ExitCode {
    let args = junction_move::cli::parse();
    match app::run(args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            junction_move::output::print_error(&format!("{e:#}"));
            ExitCode::from(1)
        }
    }
}
