use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match threatdraw::cli::run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:?}", e);
            ExitCode::from(threatdraw::errors::get_exit_code(&e))
        }
    }
}
