use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tgsender::plan::{PlanError, WorkPlan, PLAN_FILE_NAME};

fn write_plan(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join(PLAN_FILE_NAME);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_create_defaults_caption_to_file_name_and_unsent() {
    let tmp = tempdir().unwrap();
    let plan_path = tmp.path().join(PLAN_FILE_NAME);
    let plan = WorkPlan::create(&plan_path, ["/videos/01 intro.mp4", "/videos/notes.pdf"]);
    plan.save().expect("save should succeed");

    let reloaded = WorkPlan::load(&plan_path).expect("plan should load");
    let items: Vec<_> = reloaded.items().collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].caption, "01 intro.mp4");
    assert_eq!(items[0].output_path, PathBuf::from("/videos/01 intro.mp4"));
    assert_eq!(items[0].source_path, items[0].output_path);
    assert!(items.iter().all(|i| !i.sent), "fresh plan must be all unsent");

    let header = fs::read_to_string(&plan_path).unwrap();
    assert!(header.starts_with("file_output,description,sent"), "got: {header}");
}

#[test]
fn test_load_adds_sent_column_and_persists_it() {
    let tmp = tempdir().unwrap();
    let path = write_plan(
        tmp.path(),
        "file_output,description\n/a/one.txt,first\n/a/two.txt,second\n",
    );

    let plan = WorkPlan::load(&path).expect("plan should load");
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.pending_count(), 2);

    let on_disk = fs::read_to_string(&path).unwrap();
    let mut lines = on_disk.lines();
    assert_eq!(lines.next(), Some("file_output,description,sent"));
    assert_eq!(lines.next(), Some("/a/one.txt,first,0"));
    assert_eq!(lines.next(), Some("/a/two.txt,second,0"));
}

#[test]
fn test_next_unsent_follows_stored_order() {
    let tmp = tempdir().unwrap();
    let path = write_plan(
        tmp.path(),
        "file_output,description,sent\n/a,a,1\n/b,b,0\n/c,c,1\n/d,d,0\n",
    );
    let plan = WorkPlan::load(&path).unwrap();

    let (idx, item) = plan.next_unsent().expect("there are unsent rows");
    assert_eq!(idx, 1);
    assert_eq!(item.output_path, PathBuf::from("/b"));

    let (idx, item) = plan.next_unsent_from(2).expect("row /d is unsent");
    assert_eq!(idx, 3);
    assert_eq!(item.output_path, PathBuf::from("/d"));

    assert!(plan.next_unsent_from(4).is_none());
}

#[test]
fn test_mark_sent_flips_one_row_and_persists() {
    let tmp = tempdir().unwrap();
    let path = write_plan(tmp.path(), "file_output,description,sent\n/a,a,0\n/b,b,0\n");
    let mut plan = WorkPlan::load(&path).unwrap();

    plan.mark_sent(Path::new("/a")).expect("unique key should be marked");

    let reloaded = WorkPlan::load(&path).unwrap();
    let sent: Vec<bool> = reloaded.items().map(|i| i.sent).collect();
    assert_eq!(sent, vec![true, false]);
    assert_eq!(reloaded.next_unsent().map(|(i, _)| i), Some(1));

    plan.mark_sent(Path::new("/b")).unwrap();
    assert!(WorkPlan::load(&path).unwrap().next_unsent().is_none());
}

#[test]
fn test_mark_sent_fails_on_duplicate_key_without_touching_the_file() {
    let tmp = tempdir().unwrap();
    let original = "file_output,description,sent\n/dup,first,0\n/dup,second,0\n";
    let path = write_plan(tmp.path(), original);
    let mut plan = WorkPlan::load(&path).unwrap();

    let err = plan.mark_sent(Path::new("/dup")).unwrap_err();
    assert!(
        matches!(err, PlanError::AmbiguousKey { matches: 2, .. }),
        "expected AmbiguousKey with 2 matches, got {err:?}"
    );
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
    assert_eq!(plan.pending_count(), 2);
}

#[test]
fn test_mark_sent_fails_on_unknown_key() {
    let tmp = tempdir().unwrap();
    let path = write_plan(tmp.path(), "file_output,description,sent\n/a,a,0\n");
    let mut plan = WorkPlan::load(&path).unwrap();

    let err = plan.mark_sent(Path::new("/zzz")).unwrap_err();
    assert!(
        matches!(err, PlanError::AmbiguousKey { matches: 0, .. }),
        "got {err:?}"
    );
}

#[test]
fn test_load_fails_with_corrupt_plan_when_key_column_missing() {
    let tmp = tempdir().unwrap();
    let path = write_plan(tmp.path(), "path,description\n/a,a\n");
    let err = WorkPlan::load(&path).unwrap_err();
    assert!(matches!(err, PlanError::CorruptPlan { .. }), "got {err:?}");
}

#[test]
fn test_load_fails_with_corrupt_plan_on_ragged_rows() {
    let tmp = tempdir().unwrap();
    let path = write_plan(tmp.path(), "file_output,description,sent\n/a,a,0\n/b\n");
    let err = WorkPlan::load(&path).unwrap_err();
    assert!(matches!(err, PlanError::CorruptPlan { .. }), "got {err:?}");
}

#[test]
fn test_load_fails_with_corrupt_plan_on_bad_sent_value() {
    let tmp = tempdir().unwrap();
    let path = write_plan(tmp.path(), "file_output,description,sent\n/a,a,maybe\n");
    let err = WorkPlan::load(&path).unwrap_err();
    assert!(matches!(err, PlanError::CorruptPlan { .. }), "got {err:?}");
}

#[test]
fn test_load_missing_file_is_io_error() {
    let tmp = tempdir().unwrap();
    let err = WorkPlan::load(tmp.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, PlanError::Io { .. }), "got {err:?}");
}

#[test]
fn test_sent_values_written_by_other_tools_are_understood() {
    let tmp = tempdir().unwrap();
    let path = write_plan(
        tmp.path(),
        "file_output,description,sent\n/a,a,1.0\n/b,b,True\n/c,c,\n/d,d,0.0\n",
    );
    let plan = WorkPlan::load(&path).unwrap();
    let sent: Vec<bool> = plan.items().map(|i| i.sent).collect();
    assert_eq!(sent, vec![true, true, false, false]);
}

#[test]
fn test_file_path_column_and_extra_columns_survive_rewrite() {
    let tmp = tempdir().unwrap();
    let path = write_plan(
        tmp.path(),
        "file_output,description,file_path,duration\n\
         /out/a.mp4,\"Lesson A, part 1\",/src/a.mp4,61\n\
         /out/b.mp4,Lesson B,,42\n",
    );
    let mut plan = WorkPlan::load(&path).unwrap();

    let first = plan.item(0).unwrap();
    assert_eq!(first.source_path, PathBuf::from("/src/a.mp4"));
    assert_eq!(first.caption, "Lesson A, part 1");
    let second = plan.item(1).unwrap();
    assert_eq!(second.source_path, PathBuf::from("/out/b.mp4"));

    plan.mark_sent(Path::new("/out/a.mp4")).unwrap();

    let on_disk = fs::read_to_string(&path).unwrap();
    let mut lines = on_disk.lines();
    assert_eq!(lines.next(), Some("file_output,description,file_path,duration,sent"));
    assert_eq!(lines.next(), Some("/out/a.mp4,\"Lesson A, part 1\",/src/a.mp4,61,1"));
    assert_eq!(lines.next(), Some("/out/b.mp4,Lesson B,,42,0"));
}

#[test]
fn test_project_dir_is_the_plan_folder() {
    let tmp = tempdir().unwrap();
    let plan = WorkPlan::create(tmp.path().join(PLAN_FILE_NAME), Vec::<PathBuf>::new());
    assert_eq!(plan.project_dir(), tmp.path());
    assert!(plan.is_empty());
}
