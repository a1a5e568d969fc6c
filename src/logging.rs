use flexi_logger::{
    colored_default_format, opt_format, Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError,
    Logger, LoggerHandle, Naming,
};

/// Start logging on stderr, plus rotating files when `log_dir` is given.
///
/// `RUST_LOG` overrides `level`. Keep the returned handle alive for the
/// lifetime of the process.
pub fn setup_logging(level: &str, log_dir: Option<&str>) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(level)?;

    match log_dir {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir))
            .format_for_files(opt_format)
            .format_for_stderr(colored_default_format)
            .duplicate_to_stderr(Duplicate::All)
            .rotate(
                Criterion::Size(10 * 1024 * 1024), // Rotate logs after they reach 10 MB
                Naming::Numbers,
                Cleanup::KeepLogFiles(7),
            )
            .start(),
        None => logger.format(colored_default_format).start(),
    }
}
