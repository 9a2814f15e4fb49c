use cmake_builder::{BuildConfig, BuilderError, CmakeBuilder};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let project_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Cannot determine project directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Building cmake project...");
    let builder = CmakeBuilder::new(BuildConfig::new(project_root));

    match builder.configure().and_then(|()| builder.build()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(BuilderError::CmakeNotFound { tried }) => {
            println!("ERROR: Could not start cmake. Is it installed? Is it available from console?");
            println!("ERROR: Tried: {}", tried.join(", "));
            println!("ERROR: You can install it from https://cmake.org/ and add it to PATH variable to make it available from console");
            println!("ERROR: Alternatively you can invoke it yourself via cmake-gui and generate project files for your build system");
            ExitCode::FAILURE
        }
        Err(BuilderError::CmakeFailed { command, code }) => {
            println!("ERROR: Cmake finished with returncode={}", code);
            println!("ERROR: Failing command: {}", command);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        Err(e) => {
            error!("Build failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
