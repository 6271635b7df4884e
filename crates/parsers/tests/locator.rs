use parsers::{Error, SourceLocator};
use std::fs;
use tempfile::tempdir;

#[test]
fn offset_walk_skips_comments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.conf");
    fs::write(&path, "l1\n#c\nl2\nl3\n").unwrap();
    let mut locator = SourceLocator::new(dir.path());
    assert_eq!(locator.find_line(&path, 1, 1, None).unwrap(), "l2");
    assert_eq!(locator.find_line(&path, 1, 2, None).unwrap(), "l3");
}

#[test]
fn walking_past_the_end_returns_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.conf");
    fs::write(&path, "l1\nl2\n").unwrap();
    let mut locator = SourceLocator::new(dir.path());
    assert_eq!(locator.find_line(&path, 1, 5, None).unwrap(), "");
    assert_eq!(locator.find_line(&path, 1, 0, Some("nothing")).unwrap(), "");
    let err = locator.find_line(&path, 9, 0, None).unwrap_err();
    assert!(matches!(err, Error::LineOutOfRange { line: 9, len: 2, .. }));
}

#[test]
fn continued_directive_is_returned_whole() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.conf");
    fs::write(
        &path,
        "<Macro m $a>\nSecRule ARGS \\\n  \"@rx $a\" \\\n  \"id:1\"\n</Macro>\n",
    )
    .unwrap();
    let mut locator = SourceLocator::new(dir.path());
    let line = locator.find_line(&path, 1, 1, None).unwrap();
    assert_eq!(line, "SecRule ARGS \"@rx $a\" \"id:1\"");
    assert_eq!(locator.files_read(), 1);
}

#[test]
fn macro_definition_is_parsed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.conf");
    fs::write(&path, "\n<Macro test_macro arg1 arg2>\nUse other\n").unwrap();
    let mut locator = SourceLocator::new(dir.path());
    let sig = locator.parse_macro_def(&path, 2).unwrap();
    assert_eq!(sig.name, "test_macro");
    assert_eq!(sig.params, vec!["arg1", "arg2"]);

    let err = locator.parse_macro_def(&path, 3).unwrap_err();
    assert!(err.is_structural());
}

#[test]
fn unreadable_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let mut locator = SourceLocator::new(dir.path());
    let err = locator
        .find_line(&dir.path().join("missing.conf"), 1, 0, None)
        .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(!err.is_structural());
}
