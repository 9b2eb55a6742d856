use std::process::ExitCode;

fn main() -> ExitCode {
    match logfetch::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(logfetch::exit_code(&err))
        }
    }
}
