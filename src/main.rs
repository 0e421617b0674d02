use std::process::ExitCode;

fn main() -> ExitCode {
    rollcall_lib::run()
}
