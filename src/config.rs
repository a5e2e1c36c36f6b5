use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Draws Rekognition Custom Labels detections onto an image stored in S3.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "custom_labels")]
#[command(version)]
pub struct CliArgs {
    /// The name of the bucket holding the image
    #[arg(long)]
    pub bucket: Option<String>,

    /// The S3 object key of the image file (JPEG, JPG, PNG)
    #[arg(long)]
    pub key: Option<String>,

    /// The Rekognition Custom Labels model ARN
    #[arg(long)]
    pub model_arn: Option<String>,

    /// The minimum confidence value (0-100) [default: 70]
    #[arg(long)]
    pub min_confidence: Option<f32>,

    /// Where to write the annotated PNG [default: output.png]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// AWS region, overriding the ambient configuration
    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(
        default = "default_log_level",
        deserialize_with = "deserialize_log_level"
    )]
    pub log_level: LogLevel,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.detection.validate()?;
        self.annotation.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub model_arn: String,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_min_confidence() -> f32 {
    70.0
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: String::new(),
            model_arn: String::new(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("bucket", &self.bucket),
            ("key", &self.key),
            ("model-arn", &self.model_arn),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "Missing required parameter(s): --{}",
                missing.join(", --")
            ));
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(format!(
                "min-confidence must be between 0 and 100, got {}",
                self.min_confidence
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Custom endpoint shared by both services, e.g. a local S3 emulator.
    pub endpoint_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            endpoint_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AwsConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnnotationConfig {
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
    #[serde(default = "default_font_scale")]
    pub font_scale: f32,
    #[serde(default = "default_color")]
    pub color: [u8; 3],
}

fn default_stroke_width() -> u32 {
    10
}

fn default_font_scale() -> f32 {
    100.0
}

fn default_color() -> [u8; 3] {
    [255, 0, 0]
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            stroke_width: default_stroke_width(),
            font_scale: default_font_scale(),
            color: default_color(),
        }
    }
}

impl AnnotationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.stroke_width == 0 {
            return Err("annotation.stroke_width must be at least 1".to_string());
        }
        if self.font_scale <= 0.0 {
            return Err(format!(
                "annotation.font_scale must be positive, got {}",
                self.font_scale
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output.png")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

/// Resolves settings from `./configuration`, `CL_*` environment variables
/// and the command line, in increasing order of precedence.
pub fn get_configuration(args: &CliArgs) -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("Failed to read cwd: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    build_configuration(&configuration_directory, &environment, args)
}

fn build_configuration(
    configuration_directory: &Path,
    environment: &Environment,
    args: &CliArgs,
) -> Result<Config, config::ConfigError> {
    let output = args
        .output
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(false))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("CL")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("detection.bucket", args.bucket.clone())?
        .set_override_option("detection.key", args.key.clone())?
        .set_override_option("detection.model_arn", args.model_arn.clone())?
        // Read only after parsing so a user-supplied value always wins.
        .set_override_option(
            "detection.min_confidence",
            args.min_confidence.map(f64::from),
        )?
        .set_override_option("output.path", output)?
        .set_override_option("aws.region", args.region.clone())?
        .build()?;

    let config = settings.try_deserialize::<Config>()?;
    config.validate().map_err(config::ConfigError::Message)?;

    Ok(config)
}
