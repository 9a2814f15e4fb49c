use clap::Parser;
use harness::{run_suite, suite_exit_code, HarnessConfig, HarnessError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Run the cutSphereMove regression tests and generate point set viewers")]
struct Cli {
    /// CMake build directory holding the executable (defaults to ./build)
    build_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let project_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!("Cannot determine project directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut config = HarnessConfig::new(&project_root);
    if let Some(build_dir) = cli.build_dir {
        config = config.with_build_dir(project_root.join(build_dir));
    }

    let result = run_suite(&config).await;
    if let Err(e) = &result {
        report_fatal(e);
    }
    ExitCode::from(suite_exit_code(&result))
}

fn report_fatal(err: &HarnessError) {
    match err {
        HarnessError::ExecutableNotFound { target, candidates } => {
            println!("ERROR: Did you forget to build?");
            println!("ERROR: Cannot find {} anywhere, tried: ", target);
            for candidate in candidates {
                println!("\t{}", candidate.display());
            }
            println!(
                "ERROR: If your cmake-generated build folder is in other place - pass it as first argument"
            );
        }
        e => println!("ERROR: {}", e),
    }
}
