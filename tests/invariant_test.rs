use batchmd::config::{FileConflictConfig, Settings};
use batchmd::conflict::{is_valid_pattern, ConflictPolicy};
use batchmd::progress::{ConversionProgress, FileOutcome};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::time::Duration;

fn outcome_strategy() -> impl Strategy<Value = FileOutcome> {
    prop::sample::select(vec![
        FileOutcome::Converted,
        FileOutcome::Skipped,
        FileOutcome::Failed,
    ])
}

/// Valid rename patterns: the three placeholders in any order, separated by
/// literal text that may include INI comment and delimiter characters.
fn rename_pattern_strategy() -> impl Strategy<Value = String> {
    let literal = "[a-z0-9#;=:()_. -]{0,4}";
    (
        Just(vec!["{name}", "{counter}", "{ext}"]).prop_shuffle(),
        prop::collection::vec(literal, 4),
        any::<bool>(),
    )
        .prop_map(|(placeholders, literals, with_ext)| {
            let mut pattern = literals[0].clone();
            for (placeholder, literal) in placeholders.iter().zip(&literals[1..]) {
                if *placeholder != "{ext}" || with_ext {
                    pattern.push_str(placeholder);
                }
                pattern.push_str(literal);
            }
            pattern
        })
        .prop_filter("surrounding whitespace is trimmed on load", |p| {
            p.trim() == p && is_valid_pattern(p)
        })
}

proptest! {
    #[test]
    fn prop_percent_is_monotonic_and_reaches_100(
        files in prop::collection::vec(
            (prop::collection::vec(-0.5f64..1.5, 0..5), outcome_strategy()),
            1..12,
        )
    ) {
        let mut progress = ConversionProgress::new(files.len());
        let mut last = progress.percent();
        prop_assert_eq!(last, 0.0);

        for (i, (steps, outcome)) in files.iter().enumerate() {
            progress.start_file(format!("file{i}"));
            prop_assert!(progress.percent() >= last);
            for step in steps {
                progress.set_file_progress(*step);
                let now = progress.percent();
                prop_assert!(now >= last, "{} dropped below {}", now, last);
                prop_assert!((0.0..=100.0).contains(&now));
                last = now;
            }
            prop_assert!(progress.complete_file(*outcome));
            let now = progress.percent();
            prop_assert!(now >= last);
            last = now;
        }

        prop_assert_eq!(progress.percent(), 100.0);
        prop_assert!(progress.is_finished());
        prop_assert!(!progress.complete_file(FileOutcome::Converted));
        prop_assert_eq!(progress.completed_files(), files.len());
    }

    #[test]
    fn prop_conflict_config_round_trips(
        policy in prop::sample::select(ConflictPolicy::ALL.to_vec()),
        rename_pattern in rename_pattern_strategy(),
        remember in any::<bool>(),
        backup in any::<bool>(),
        timeout in 1u64..600,
    ) {
        let config = FileConflictConfig {
            default_policy: policy,
            rename_pattern,
            remember_choice: remember,
            backup_original: backup,
            ask_timeout: Duration::from_secs(timeout),
            timeout_policy: ConflictPolicy::Overwrite,
        };
        let mut settings = Settings::new();
        settings.set_file_conflict(&config);

        let reloaded = Settings::parse(&settings.to_ini_string()).unwrap();
        prop_assert_eq!(reloaded.file_conflict(), config);
    }
}

#[test]
fn test_settings_file_keeps_foreign_sections() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested/settings.ini");
    let mut settings =
        Settings::parse("[ui]\ntheme=dark\nwindow_width=1024\n\n[llm]\nenabled=true\nmodel=local\n")
            .unwrap();

    let mut conflict = settings.file_conflict();
    conflict.default_policy = ConflictPolicy::Skip;
    settings.set_file_conflict(&conflict);
    settings.save(&path).unwrap();

    let reloaded = Settings::load(&path).unwrap();
    assert_eq!(reloaded.get("ui", "theme").as_deref(), Some("dark"));
    assert_eq!(reloaded.get("ui", "window_width").as_deref(), Some("1024"));
    assert_eq!(reloaded.file_conflict().default_policy, ConflictPolicy::Skip);
    let llm = reloaded.llm();
    assert!(llm.enabled);
    assert_eq!(llm.model, "local");
}

#[test]
fn test_missing_settings_file_gives_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = Settings::load(dir.path().join("absent.ini")).unwrap();
    assert_eq!(settings.file_conflict(), FileConflictConfig::default());
    assert!(settings.general().recursive);
}
