use aws_creds_action::action::Action;
use aws_creds_action::factory;
use aws_creds_action::providers::github::GithubRunner;
use aws_creds_action::runner::{ExportSink, InputSource};
use std::process::ExitCode;
use tracing::{subscriber, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const RUNNER_DEBUG: &str = "RUNNER_DEBUG";

#[tokio::main]
async fn main() -> ExitCode {
    let runner = GithubRunner::from_env();

    if let Err(e) = init_logging(runner.env(RUNNER_DEBUG).as_deref() == Some("1")) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    aws_creds_action::init();
    let services = match factory::new_services("aws") {
        Ok(services) => services,
        Err(e) => {
            runner.set_failed(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    if Action::new(&runner, &runner, services.as_ref())
        .run_and_report()
        .await
    {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(runner_debug: bool) -> anyhow::Result<()> {
    let level = if runner_debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG overrides the runner debug switch
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(runner_debug)
        .with_ansi(false)
        .compact()
        .finish();

    subscriber::set_global_default(subscriber)?;

    Ok(())
}
