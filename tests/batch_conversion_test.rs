use batchmd::config::{FileTypeRegistry, Settings};
use batchmd::conflict::{ChannelPrompt, ConflictAnswer, ConflictPolicy};
use batchmd::error::ErrorCategory;
use batchmd::manager::{plan_jobs, ConversionEvent, ConversionManager};
use batchmd::progress::FileOutcome;
use batchmd::scanner::{scan, ScanOptions};
use pretty_assertions::assert_eq;
use rs_docx::document::Paragraph;
use rs_docx::formatting::{NumberingProperty, ParagraphProperty};
use rs_docx::Docx;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::thread;
use tempfile::TempDir;

fn write_docx(path: &Path) {
    let mut docx = Docx::default();
    docx.document.push(Paragraph::default().push_text("Meeting notes"));
    docx.document.push(
        Paragraph::default()
            .property(ParagraphProperty {
                numbering: Some(NumberingProperty::from((1isize, 0isize))),
                ..Default::default()
            })
            .push_text("Ship it"),
    );
    docx.write_file(path).expect("failed to write generated docx");
}

fn settings_with(policy: ConflictPolicy) -> Settings {
    let mut settings = Settings::new();
    let mut conflict = settings.file_conflict();
    conflict.default_policy = policy;
    settings.set_file_conflict(&conflict);
    settings
}

fn scanned_jobs(root: &Path, output_dir: Option<&Path>) -> Vec<batchmd::ConversionJob> {
    let tree = scan(
        root,
        &ScanOptions::default(),
        &FileTypeRegistry::builtin(),
        &AtomicBool::new(false),
    )
    .unwrap();
    plan_jobs(&tree.files(), Some(root), output_dir)
}

#[test]
fn test_scan_then_convert_mixed_folder() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    fs::create_dir(input.path().join("data")).unwrap();
    write_docx(&input.path().join("notes.docx"));
    fs::write(input.path().join("data/people.csv"), "name,role\nAda,eng\n").unwrap();
    fs::write(input.path().join("readme.txt"), "First\n\nSecond").unwrap();

    let jobs = scanned_jobs(input.path(), Some(output.path()));
    let mut manager = ConversionManager::new(&Settings::new(), FileTypeRegistry::builtin());
    let summary = manager.run(jobs);

    assert_eq!(summary.converted, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(
        fs::read_to_string(output.path().join("notes.md")).unwrap(),
        "Meeting notes\n\n- Ship it\n\n"
    );
    assert_eq!(
        fs::read_to_string(output.path().join("data/people.md")).unwrap(),
        "| name | role |\n| --- | --- |\n| Ada | eng |\n\n"
    );
    assert_eq!(
        fs::read_to_string(output.path().join("readme.md")).unwrap(),
        "First\n\nSecond\n\n"
    );
}

#[test]
fn test_corrupt_docx_reports_failure_after_fallback() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("broken.docx"), "not a zip archive").unwrap();
    fs::write(input.path().join("fine.txt"), "ok").unwrap();

    let jobs = scanned_jobs(input.path(), None);
    let mut manager = ConversionManager::new(&Settings::new(), FileTypeRegistry::builtin());
    let events = manager.subscribe();
    let summary = manager.run(jobs);

    assert_eq!(summary.converted, 1);
    assert_eq!(summary.failed, 1);
    let failed = summary
        .results
        .iter()
        .find(|r| r.outcome == FileOutcome::Failed)
        .unwrap();
    let report = failed.error.as_ref().unwrap();
    assert!(report.fallback_attempted);
    assert_ne!(report.category, ErrorCategory::Configuration);
    assert!(!report.suggestions.is_empty());
    assert!(!input.path().join("broken.md").exists());

    let failed_events = events
        .try_iter()
        .filter(|e| matches!(e, ConversionEvent::FileFinished(r) if r.error.is_some()))
        .count();
    assert_eq!(failed_events, 1);
}

#[test]
fn test_rename_policy_keeps_existing_outputs() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("report.txt"), "new").unwrap();
    fs::write(input.path().join("report.md"), "old").unwrap();
    fs::write(input.path().join("report_1.md"), "older").unwrap();

    let source = input.path().join("report.txt");
    let mut manager =
        ConversionManager::new(&settings_with(ConflictPolicy::Rename), FileTypeRegistry::builtin());
    let summary = manager.run(plan_jobs(&[source], None, None));

    assert_eq!(summary.conflicts.renamed, 1);
    assert_eq!(fs::read_to_string(input.path().join("report.md")).unwrap(), "old");
    assert_eq!(fs::read_to_string(input.path().join("report_1.md")).unwrap(), "older");
    assert_eq!(fs::read_to_string(input.path().join("report_2.md")).unwrap(), "new\n\n");
}

#[test]
fn test_overwrite_with_backup() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("a.txt"), "fresh").unwrap();
    fs::write(input.path().join("a.md"), "stale").unwrap();

    let mut settings = settings_with(ConflictPolicy::Overwrite);
    settings.set("file_conflict", "backup_original", "true");
    let mut manager = ConversionManager::new(&settings, FileTypeRegistry::builtin());
    let summary = manager.run(plan_jobs(&[input.path().join("a.txt")], None, None));

    assert_eq!(summary.conflicts.overwritten, 1);
    assert_eq!(fs::read_to_string(input.path().join("a.md")).unwrap(), "fresh\n\n");
    let backup = summary.results[0].backup.clone().unwrap();
    assert_eq!(fs::read_to_string(&backup).unwrap(), "stale");
}

#[test]
fn test_ask_policy_over_channel_on_worker() {
    let input = TempDir::new().unwrap();
    for name in ["a", "b", "c"] {
        fs::write(input.path().join(format!("{name}.txt")), name).unwrap();
        fs::write(input.path().join(format!("{name}.md")), "existing").unwrap();
    }
    let jobs = scanned_jobs(input.path(), None)
        .into_iter()
        .filter(|j| j.source.extension().is_some_and(|e| e == "txt"))
        .collect::<Vec<_>>();
    assert_eq!(jobs.len(), 3);

    let (prompt, requests) = ChannelPrompt::new();
    let manager =
        ConversionManager::new(&settings_with(ConflictPolicy::Ask), FileTypeRegistry::builtin())
            .with_prompt(Box::new(prompt));
    let handle = manager.spawn(jobs);

    // One answer with "apply to all" covers the remaining conflicts.
    let answerer = thread::spawn(move || {
        let mut asked = 0;
        while let Ok(request) = requests.recv() {
            asked += 1;
            request.respond(ConflictAnswer {
                policy: ConflictPolicy::Skip,
                apply_to_all: true,
            });
        }
        asked
    });

    let summary = handle.join().unwrap();
    assert_eq!(answerer.join().unwrap(), 1);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.conflicts.detected, 3);
    for name in ["a", "b", "c"] {
        assert_eq!(
            fs::read_to_string(input.path().join(format!("{name}.md"))).unwrap(),
            "existing"
        );
    }
}

#[test]
fn test_rerun_on_markdown_folder_adds_no_files() {
    let input = TempDir::new().unwrap();
    fs::write(input.path().join("a.md"), "# A").unwrap();
    fs::write(input.path().join("b.md"), "# B").unwrap();

    let mut manager =
        ConversionManager::new(&settings_with(ConflictPolicy::Rename), FileTypeRegistry::builtin());
    for _ in 0..2 {
        let summary = manager.run(scanned_jobs(input.path(), None));
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.conflicts.renamed, 0);
    }

    let mut names: Vec<_> = fs::read_dir(input.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.md", "b.md"]);
    assert_eq!(fs::read_to_string(input.path().join("a.md")).unwrap(), "# A");
}
