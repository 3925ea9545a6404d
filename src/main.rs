use montage::cli::Args;
use montage::config::{self, Settings};
use montage::core::Context;
use montage::document::render::export_render_document;
use montage::entities::Profile;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use log::{info, warn};
use std::process::ExitCode;

/// Repairs need confirmation that was not given
const EXIT_NEEDS_CONFIRMATION: u8 = 2;

fn init_logging(args: &Args, path_config: &config::PathConfig) {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        match std::fs::File::create(&log_path) {
            Ok(file) => {
                env_logger::Builder::new()
                    .filter_level(log_level)
                    .format_timestamp_millis()
                    .target(env_logger::Target::Pipe(Box::new(file)))
                    .init();
                info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
                return;
            }
            Err(e) => eprintln!("Warning: cannot create log file {}: {}", log_path.display(), e),
        }
    }

    // respects RUST_LOG if set
    let default_level = match args.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn load_settings(args: &Args, path_config: &config::PathConfig) -> Result<Settings> {
    let mut settings = Settings::load(path_config).unwrap_or_else(|e| {
        warn!("{:#}, using defaults", e);
        Settings::default()
    });
    if let Some(name) = &args.profile {
        if Profile::by_name(name).is_none() {
            bail!(
                "Unknown profile {} (known: {})",
                name,
                Profile::builtin_names().collect::<Vec<_>>().join(", ")
            );
        }
        settings.fallback_profile = name.clone();
    }
    Ok(settings)
}

fn run(args: Args) -> Result<ExitCode> {
    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config);

    let settings = load_settings(&args, &path_config)?;
    info!("Backend path: {}", settings.renderer_path().display());
    let mut ctx = Context::new(settings, path_config);

    let pending = ctx
        .inspect_project(&args.project, args.search.as_deref())
        .with_context(|| format!("Failed to read {}", args.project.display()))?;
    if pending.upgraded {
        println!("Document upgraded from an older version");
    }
    for item in &pending.plan.items {
        println!("{:<20} {:<24} {} [{}]", item.kind, item.id, item.path, item.state);
    }
    if pending.plan.requires_confirmation() && !args.accept_repairs {
        println!("Repairs need confirmation, rerun with --accept-repairs");
        return Ok(ExitCode::from(EXIT_NEEDS_CONFIRMATION));
    }

    let project = ctx
        .load_document(pending, args.accept_repairs)
        .with_context(|| format!("Failed to load {}", args.project.display()))?;
    println!(
        "{}: {} tracks, {} frames, {} clips",
        args.project.display(),
        project.timeline.track_count().saturating_sub(1),
        project.timeline.duration(),
        project.timeline.registry().clips().count()
    );

    if args.accept_repairs && project.modified {
        project
            .save_as(&args.project)
            .with_context(|| format!("Failed to save {}", args.project.display()))?;
        println!("Saved repaired project");
    }
    if let Some(script) = &args.render_script {
        export_render_document(project, script)
            .with_context(|| format!("Failed to write render document {}", script.display()))?;
        println!("Render document: {}", script.display());
    }
    ctx.close_project();
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
