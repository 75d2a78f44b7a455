//! CLI for batchmd - batch document to Markdown converter

use batchmd::config::{FileTypeRegistry, Settings, SETTINGS_FILENAME};
use batchmd::conflict::{
    is_valid_pattern, ChannelPrompt, ConflictAnswer, ConflictPolicy, ConflictRequest,
};
use batchmd::manager::{plan_jobs, BatchSummary, ConversionEvent, ConversionManager};
use batchmd::progress::FileOutcome;
use batchmd::scanner::{scan, ScanOptions};
use batchmd::ImageHandling;
use clap::{Args as ClapArgs, Parser, Subcommand};
use dialoguer::{Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (created by --save-settings or `settings set`)
    #[arg(long, global = true, default_value = SETTINGS_FILENAME)]
    settings: PathBuf,

    /// Log conversion details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the convertible files below a directory
    Scan {
        path: PathBuf,

        #[command(flatten)]
        walk: WalkArgs,

        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert a file or every convertible file below a directory
    Convert(ConvertArgs),
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(ClapArgs, Debug)]
struct WalkArgs {
    /// Only look at the top level of the directory
    #[arg(long)]
    no_recursive: bool,

    /// Descend into hidden files and directories
    #[arg(long)]
    hidden: bool,
}

#[derive(ClapArgs, Debug)]
struct ConvertArgs {
    /// Input file or directory
    input: PathBuf,

    /// Output directory (mirrors the input layout; default: next to each source)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// What to do when the output already exists: skip, overwrite, rename or ask
    #[arg(long)]
    policy: Option<ConflictPolicy>,

    /// Rename pattern using {name}, {counter} and {ext}
    #[arg(long)]
    pattern: Option<String>,

    /// Keep a timestamped copy of files that get overwritten
    #[arg(long)]
    backup: bool,

    /// Directory to extract images to (if not set, images are embedded/inline)
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Skip extracting images
    #[arg(long)]
    skip_images: bool,

    /// Do not retry failed files with the fallback backend
    #[arg(long)]
    no_fallback: bool,

    #[command(flatten)]
    walk: WalkArgs,

    /// Write the effective options back to the settings file
    #[arg(long)]
    save_settings: bool,

    /// Print the batch summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print every setting, defaults included
    Show,
    /// Set one key, e.g. `settings set file_conflict default_policy skip`
    Set {
        section: String,
        key: String,
        value: String,
    },
    /// Print the supported file types
    FileTypes,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("batchmd=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let mut settings = match Settings::load(&cli.settings) {
        Ok(settings) => settings,
        Err(e) => fail(&format!("Error reading settings: {}", e)),
    };
    let registry = load_registry(&settings);

    match cli.command {
        Command::Scan { path, walk, json } => run_scan(&path, &walk, &settings, &registry, json),
        Command::Convert(args) => {
            let code = run_convert(args, &mut settings, &cli.settings, registry);
            std::process::exit(code);
        }
        Command::Settings { action } => run_settings(action, &mut settings, &cli.settings, &registry),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn load_registry(settings: &Settings) -> FileTypeRegistry {
    match settings.general().file_types {
        Some(path) => FileTypeRegistry::load(&path)
            .unwrap_or_else(|e| fail(&format!("Error reading file types {:?}: {}", path, e))),
        None => FileTypeRegistry::builtin(),
    }
}

fn scan_options(walk: &WalkArgs, settings: &Settings) -> ScanOptions {
    let general = settings.general();
    ScanOptions {
        recursive: general.recursive && !walk.no_recursive,
        include_hidden: general.include_hidden || walk.hidden,
        max_depth: None,
    }
}

fn run_scan(path: &Path, walk: &WalkArgs, settings: &Settings, registry: &FileTypeRegistry, json: bool) {
    let tree = match scan(path, &scan_options(walk, settings), registry, &AtomicBool::new(false)) {
        Ok(tree) => tree,
        Err(e) => fail(&format!("Error scanning {:?}: {}", path, e)),
    };
    if json {
        match serde_json::to_string_pretty(&tree) {
            Ok(text) => println!("{}", text),
            Err(e) => fail(&format!("Error encoding scan result: {}", e)),
        }
        return;
    }
    print!("{}", tree.render());
    println!("{} convertible file(s)", tree.file_count());
    if tree.unreadable > 0 {
        println!("{} entr(ies) could not be read", tree.unreadable);
    }
}

/// Folds command-line overrides into the loaded settings.
fn apply_overrides(args: &ConvertArgs, settings: &mut Settings) {
    let mut general = settings.general();
    if args.output_dir.is_some() {
        general.output_dir = args.output_dir.clone();
    }
    general.recursive = general.recursive && !args.walk.no_recursive;
    general.include_hidden = general.include_hidden || args.walk.hidden;
    settings.set_general(&general);

    let mut conversion = settings.conversion();
    if args.skip_images {
        conversion.image_handling = ImageHandling::Skip;
    } else if let Some(dir) = &args.images_dir {
        conversion.image_handling = ImageHandling::SaveToDir(dir.clone());
    }
    if args.no_fallback {
        conversion.enable_fallback = false;
    }
    settings.set_conversion(&conversion);

    let mut conflict = settings.file_conflict();
    if let Some(policy) = args.policy {
        conflict.default_policy = policy;
    }
    if let Some(pattern) = &args.pattern {
        conflict.rename_pattern = pattern.clone();
    }
    if args.backup {
        conflict.backup_original = true;
    }
    settings.set_file_conflict(&conflict);
}

fn run_convert(
    args: ConvertArgs,
    settings: &mut Settings,
    settings_path: &Path,
    registry: FileTypeRegistry,
) -> i32 {
    if let Some(pattern) = &args.pattern {
        if !is_valid_pattern(pattern) {
            fail(&format!(
                "Invalid rename pattern {:?}: use {{name}}, {{ext}} and a required {{counter}}",
                pattern
            ));
        }
    }
    apply_overrides(&args, settings);
    if args.save_settings {
        if let Err(e) = settings.save(settings_path) {
            fail(&format!("Error writing settings: {}", e));
        }
    }

    let general = settings.general();
    let options = ScanOptions {
        recursive: general.recursive,
        include_hidden: general.include_hidden,
        max_depth: None,
    };
    let tree = match scan(&args.input, &options, &registry, &AtomicBool::new(false)) {
        Ok(tree) => tree,
        Err(e) => fail(&format!("Error scanning {:?}: {}", args.input, e)),
    };
    let files = tree.files();
    if files.is_empty() {
        println!("Nothing to convert in {:?}", args.input);
        return 0;
    }
    let input_root = if args.input.is_dir() {
        Some(args.input.as_path())
    } else {
        None
    };
    let jobs = plan_jobs(&files, input_root, general.output_dir.as_deref());

    let mut manager = ConversionManager::new(settings, registry);
    let requests = if settings.file_conflict().default_policy == ConflictPolicy::Ask {
        let (prompt, requests) = ChannelPrompt::new();
        manager = manager.with_prompt(Box::new(prompt));
        Some(requests)
    } else {
        None
    };

    let handle = manager.spawn(jobs);
    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    while !handle.is_finished() {
        if let Some(requests) = &requests {
            while let Ok(request) = requests.try_recv() {
                answer_conflict(&bar, request);
            }
        }
        for event in handle.events().try_iter() {
            report_event(&bar, &event);
        }
        let snapshot = handle.progress().snapshot();
        bar.set_position(snapshot.completed_files as u64);
        bar.set_message(snapshot.current_file.unwrap_or_default());
        std::thread::sleep(Duration::from_millis(100));
    }
    for event in handle.events().try_iter() {
        report_event(&bar, &event);
    }
    bar.finish_and_clear();

    let summary = match handle.join() {
        Ok(summary) => summary,
        Err(e) => fail(&format!("Error converting: {}", e)),
    };
    print_summary(&summary, args.json);
    if summary.failed > 0 {
        2
    } else {
        0
    }
}

fn report_event(bar: &ProgressBar, event: &ConversionEvent) {
    match event {
        ConversionEvent::FileFinished(result) if result.outcome == FileOutcome::Failed => {
            if let Some(report) = &result.error {
                bar.println(format!("failed: {:?}: {}", result.source, report.message));
                for hint in &report.suggestions {
                    bar.println(format!("  hint: {}", hint));
                }
            }
        }
        ConversionEvent::BackendDisabled { backend } => {
            bar.println(format!("backend '{}' disabled after repeated failures", backend));
        }
        _ => {}
    }
}

fn answer_conflict(bar: &ProgressBar, request: ConflictRequest) {
    let info = &request.info;
    let choices = [ConflictPolicy::Skip, ConflictPolicy::Overwrite, ConflictPolicy::Rename];
    let labels: Vec<String> = choices.iter().map(|p| p.to_string()).collect();
    let default = info
        .suggested
        .and_then(|s| choices.iter().position(|c| *c == s))
        .unwrap_or(2);

    let answer = bar.suspend(|| {
        let choice = Select::new()
            .with_prompt(format!("{:?} already exists", info.target_path))
            .items(&labels)
            .default(default)
            .interact()
            .ok()?;
        let apply_to_all = Confirm::new()
            .with_prompt("Apply to all remaining conflicts?")
            .default(false)
            .interact()
            .ok()?;
        Some(ConflictAnswer {
            policy: choices[choice],
            apply_to_all,
        })
    });
    // Dropping the request unanswered makes the worker use the timeout policy.
    if let Some(answer) = answer {
        if !request.respond(answer) {
            bar.println("answer arrived after the prompt timed out");
        }
    }
}

fn print_summary(summary: &BatchSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error encoding summary: {}", e),
        }
        return;
    }
    for result in &summary.results {
        if let (FileOutcome::Converted, Some(output)) = (result.outcome, &result.output) {
            let via = if result.used_fallback { " (fallback)" } else { "" };
            println!("{:?} -> {:?}{}", result.source, output, via);
        }
    }
    println!(
        "{} converted, {} skipped, {} failed in {:.1}s",
        summary.converted,
        summary.skipped,
        summary.failed,
        summary.elapsed.as_secs_f64()
    );
    let c = summary.conflicts;
    if c.detected > 0 {
        println!(
            "conflicts: {} detected, {} skipped, {} overwritten, {} renamed",
            c.detected, c.skipped, c.overwritten, c.renamed
        );
    }
    if summary.cancelled {
        println!("cancelled before all files were processed");
    }
}

fn run_settings(
    action: SettingsAction,
    settings: &mut Settings,
    settings_path: &Path,
    registry: &FileTypeRegistry,
) {
    match action {
        SettingsAction::Show => {
            // Round-trip through the typed views so defaults are printed too.
            let mut effective = settings.clone();
            effective.set_general(&settings.general());
            effective.set_conversion(&settings.conversion());
            effective.set_file_conflict(&settings.file_conflict());
            effective.set_llm(&settings.llm());
            println!("# {}", settings_path.display());
            print!("{}", effective.to_ini_string());
        }
        SettingsAction::Set {
            section,
            key,
            value,
        } => {
            settings.set(&section, &key, &value);
            if let Err(e) = settings.save(settings_path) {
                fail(&format!("Error writing settings: {}", e));
            }
            println!("[{}] {} = {}", section, key, value);
        }
        SettingsAction::FileTypes => {
            let mut types: Vec<_> = registry.iter().collect();
            types.sort_by(|a, b| a.extension.cmp(&b.extension));
            for file_type in types {
                let fallback = file_type.fallback.as_deref().unwrap_or("-");
                println!(
                    "{:<10} {:<10} {:<10} {}",
                    file_type.extension, file_type.backend, fallback, file_type.description
                );
            }
        }
    }
}
