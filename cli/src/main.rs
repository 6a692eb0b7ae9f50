use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use image_converter::cli::{Cli, Command};
use image_converter::error::CliError;
use image_converter::io::{checked_output, read_file, write_file};
use image_converter::report::{capabilities_summary, Outcome};
use image_converter_core::intake::{parse_output_format, validate_upload};
use image_converter_core::{ConversionEngine, ConversionMode, EngineConfig, FormatRegistry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = cli.engine_config();

    match &cli.command {
        Command::Convert {
            input,
            output,
            to,
            quality,
        } => handle_convert(config, input, output.as_deref(), to, *quality),
        Command::Compress {
            input,
            output,
            quality,
        } => handle_compress(config, input, output.as_deref(), *quality),
        Command::Capabilities => {
            let svg_tool = config.rsvg_command.clone();
            let vectorizer = config.potrace_command.clone();
            let engine = ConversionEngine::with_system_tools(config);
            println!("{}", capabilities_summary(&engine.capabilities(), &svg_tool, &vectorizer));
            Ok(())
        }
    }
}

fn handle_convert(
    config: EngineConfig,
    input: &Path,
    output: Option<&Path>,
    to: &str,
    quality: Option<i64>,
) -> Result<()> {
    let registry = FormatRegistry::conversion();
    let target = parse_output_format(&registry, to).map_err(CliError::from)?;
    let upload = load(&registry, input)?;
    let output_path = checked_output(input, output, &upload.download_name(ConversionMode::Convert, target))?;

    let engine = ConversionEngine::with_system_tools(config);
    let request = upload.into_convert_request(target, quality);
    let result = engine
        .convert(&request)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to convert {}", input.display()))?;

    write_file(&output_path, &result.bytes)?;
    Outcome::new(output_path, &result).print_summary();
    Ok(())
}

fn handle_compress(
    config: EngineConfig,
    input: &Path,
    output: Option<&Path>,
    quality: Option<i64>,
) -> Result<()> {
    let registry = FormatRegistry::compression();
    let upload = load(&registry, input)?;
    let output_path = checked_output(input, output, &upload.download_name(ConversionMode::Compress, upload.format))?;

    let engine = ConversionEngine::with_system_tools(config);
    let request = upload
        .into_compress_request(quality)
        .map_err(|e| CliError::Conversion(e.into()))?;
    let result = engine
        .convert(&request)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to compress {}", input.display()))?;

    write_file(&output_path, &result.bytes)?;
    Outcome::new(output_path, &result).print_summary();
    Ok(())
}

fn load(
    registry: &FormatRegistry,
    input: &Path,
) -> Result<image_converter_core::intake::ValidatedUpload> {
    let data = read_file(input)?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let upload = validate_upload(registry, &file_name, None, data)
        .map_err(CliError::from)
        .with_context(|| format!("Rejected {}", input.display()))?;
    log::debug!("{} sniffed as {}", input.display(), upload.mime);
    Ok(upload)
}
