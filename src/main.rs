use clap::Parser;
use custom_labels::{
    config::{self, CliArgs, LogLevel},
    start_app, AppError,
};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config = config::get_configuration(&args);

    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or(LogLevel::Info);
    let log_level = &format!(
        "{},aws_config=warn,aws_smithy_runtime=warn,aws_sdk_s3=warn,aws_sdk_rekognition=warn",
        log_level.as_str()
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match config {
        Ok(config) => start_app(config).await,
        Err(e) => Err(AppError::from(e)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
