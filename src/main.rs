use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use xtdriver::{DriverError, DriverSettings, RunOptions, RunSummary, Spec, TestDriver};
use xtdriver_engine_process::ProcessEngine;
use xtdriver_traits::ByteCodeLevel;

#[derive(Parser, Debug)]
#[command(version, about = "Runs an XSLT conformance test suite against a processor")]
struct Args {
    /// Directory holding catalog.xml
    suite_dir: PathBuf,

    /// Directory for the results document, summary and saved outputs
    results_dir: PathBuf,

    /// Only run test cases whose name matches this regex
    #[arg(long)]
    test: Option<String>,

    /// Only run the named test set
    #[arg(long)]
    set: Option<String>,

    #[arg(long)]
    debug: bool,

    #[arg(long)]
    unfolded: bool,

    #[arg(long)]
    export: bool,

    /// Fail cases whose optimization assertion does not hold
    #[arg(long)]
    strict: bool,

    /// Save principal and secondary results under <results_dir>/results
    #[arg(long)]
    save: bool,

    #[arg(long, default_value = "off", value_parser = parse_byte_code)]
    bytecode: ByteCodeLevel,

    #[arg(long, default_value = "XT30", value_parser = parse_spec)]
    lang: Spec,

    #[arg(long, default_value = "on", value_parser = parse_switch)]
    xt30: bool,

    /// Driver settings file (defaults to xtdriver.toml in the results directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exceptions file, relative to the results directory or absolute
    #[arg(long)]
    exceptions: Option<String>,
}

fn parse_byte_code(text: &str) -> Result<ByteCodeLevel, String> {
    ByteCodeLevel::parse(text).ok_or_else(|| format!("expected on, off or debug, got '{}'", text))
}

fn parse_spec(text: &str) -> Result<Spec, String> {
    Spec::parse(text).map_err(|e| e.to_string())
}

fn parse_switch(text: &str) -> Result<bool, String> {
    match text {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

/// Rewrites `-t:regex`, `-bytecode:on`, `-save` and friends into their long
/// forms so both spellings reach clap.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    const LEGACY: &[(&str, &str)] = &[
        ("t", "test"),
        ("s", "set"),
        ("debug", "debug"),
        ("unfolded", "unfolded"),
        ("export", "export"),
        ("strict", "strict"),
        ("save", "save"),
        ("bytecode", "bytecode"),
        ("lang", "lang"),
        ("xt30", "xt30"),
    ];
    args.into_iter()
        .map(|arg| {
            let Some(rest) = arg.strip_prefix('-').filter(|r| !r.starts_with('-')) else {
                return arg;
            };
            let (name, value) = match rest.split_once(':') {
                Some((name, value)) => (name, Some(value)),
                None => (rest, None),
            };
            match LEGACY.iter().find(|(legacy, _)| *legacy == name) {
                Some((_, long)) => match value {
                    Some(value) => format!("--{}={}", long, value),
                    None => format!("--{}", long),
                },
                None => arg,
            }
        })
        .collect()
}

fn run(args: Args) -> Result<RunSummary, DriverError> {
    let settings = DriverSettings::load(args.config.as_deref(), &args.results_dir)?;
    let engine = ProcessEngine::new(
        &settings.engine.program,
        settings.engine.args.clone(),
        settings.edition()?,
    )
    .with_product(&settings.engine.product_name, &settings.engine.product_version);

    let mut options = RunOptions::new(args.suite_dir, args.results_dir)
        .with_spec(args.lang)
        .with_strict(args.strict)
        .with_save_results(args.save)
        .with_unfolded(args.unfolded)
        .with_skip_list(settings.skip.clone());
    if let Some(pattern) = args.test {
        options = options.with_test_pattern(pattern);
    }
    if let Some(set) = args.set {
        options = options.with_test_set(set);
    }
    if let Some(file) = args.exceptions {
        options = options.with_exceptions_file(file);
    }
    options.export = args.export;
    options.byte_code = args.bytecode;
    options.xt30 = args.xt30;
    options.unshared_environments = settings.unshared.clone();

    info!(
        "Testing {} {} ({}) against {}",
        settings.engine.product_name,
        settings.engine.product_version,
        settings.engine.edition,
        options.suite_dir.display()
    );
    TestDriver::new(&engine, options)?.run()
}

fn main() -> ExitCode {
    let args = Args::parse_from(normalize_args(std::env::args()));
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("xtdriver failed: {}", e);
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_legacy_arguments_are_rewritten() {
        let args = normalize_args(strings(&[
            "xtdriver",
            "/suite",
            "/results",
            "-t:^atomic-0[0-9]$",
            "-s:atomic",
            "-bytecode:debug",
            "-save",
            "-xt30:off",
        ]));
        assert_eq!(
            args,
            strings(&[
                "xtdriver",
                "/suite",
                "/results",
                "--test=^atomic-0[0-9]$",
                "--set=atomic",
                "--bytecode=debug",
                "--save",
                "--xt30=off",
            ])
        );
    }

    #[test]
    fn test_long_and_unknown_arguments_pass_through() {
        let args = strings(&["xtdriver", "--strict", "-x:1", "/suite"]);
        assert_eq!(normalize_args(args.clone()), args);
    }

    #[test]
    fn test_parse_both_spellings() {
        let legacy = Args::parse_from(normalize_args(strings(&[
            "xtdriver", "/suite", "/results", "-lang:XT20", "-strict",
        ])));
        let long = Args::parse_from(strings(&[
            "xtdriver", "/suite", "/results", "--lang", "XT20", "--strict",
        ]));
        assert_eq!(legacy.lang, Spec::Xt20);
        assert_eq!(long.lang, Spec::Xt20);
        assert!(legacy.strict && long.strict);
        assert!(legacy.xt30);
        assert_eq!(legacy.bytecode, ByteCodeLevel::Off);
    }

    #[test]
    fn test_bad_switch_is_rejected() {
        assert!(
            Args::try_parse_from(strings(&["xtdriver", "/s", "/r", "--xt30=maybe"])).is_err()
        );
    }
}
