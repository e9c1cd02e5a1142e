use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use sombra_consistency::report::CollectingLogger;
use sombra_consistency::store::builder::StoreBuilder;
use sombra_consistency::store::{NodeFormat, RecordFormat, StoreError};
use sombra_consistency::types::StoreKind;
use sombra_consistency::{
    CheckConfig, CheckError, CheckSummary, DirectStoreAccess, FullCheck, InconsistencyKind,
    RecordType,
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn seeded(builder: &StoreBuilder) -> Result<TempDir, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    builder.write_to(dir.path())?;
    Ok(dir)
}

fn check_dir(dir: &Path) -> Result<CheckSummary, CheckError> {
    let stores = DirectStoreAccess::open(dir)?;
    FullCheck::new(CheckConfig::default()).execute(&stores, Arc::new(CollectingLogger::new()))
}

#[test]
fn written_demo_checks_clean() -> TestResult {
    let dir = seeded(&StoreBuilder::demo())?;
    let summary = check_dir(dir.path())?;
    assert!(summary.is_consistent(), "{summary}");
    assert_eq!(summary.total(), 0);
    Ok(())
}

#[test]
fn on_disk_and_in_memory_agree() -> TestResult {
    let mut b = StoreBuilder::demo();
    if let Some(rel) = b.relationship_mut(1) {
        rel.second_node = 3;
    }
    let dir = seeded(&b)?;
    let from_disk = check_dir(dir.path())?;
    let in_memory = FullCheck::new(CheckConfig::default())
        .execute(&b.build_in_memory()?, Arc::new(CollectingLogger::new()))?;
    assert!(!from_disk.is_consistent());
    assert_eq!(from_disk, in_memory);
    Ok(())
}

#[test]
fn garbage_in_use_byte_is_reported_not_raised() -> TestResult {
    let dir = seeded(&StoreBuilder::demo())?;
    let path = dir.path().join(StoreKind::Node.file_name());
    let mut file = OpenOptions::new().write(true).open(&path)?;
    file.seek(SeekFrom::Start(4 * NodeFormat.record_size() as u64))?;
    file.write_all(&[0x5A])?;
    drop(file);

    let summary = check_dir(dir.path())?;
    assert!(!summary.is_consistent());
    let undecodable: Vec<_> = summary
        .findings_of(InconsistencyKind::RecordNotDecodable)
        .collect();
    assert_eq!(undecodable.len(), 1);
    assert_eq!(undecodable[0].record_type, RecordType::Node);
    assert_eq!(undecodable[0].id, 4);
    Ok(())
}

#[test]
fn truncated_trailing_record_is_ignored() -> TestResult {
    let dir = seeded(&StoreBuilder::demo())?;
    let path = dir.path().join(StoreKind::Relationship.file_name());
    let mut file = OpenOptions::new().append(true).open(&path)?;
    file.write_all(&[1, 0, 0])?;
    drop(file);
    assert!(check_dir(dir.path())?.is_consistent());
    Ok(())
}

#[test]
fn missing_store_file_fails_to_open() -> TestResult {
    let dir = seeded(&StoreBuilder::demo())?;
    fs::remove_file(dir.path().join(StoreKind::Property.file_name()))?;
    let err = check_dir(dir.path()).unwrap_err();
    assert!(matches!(err, CheckError::Store(StoreError::Missing(_))), "{err}");
    Ok(())
}

#[test]
fn truncated_index_file_names_the_task() -> TestResult {
    let mut b = StoreBuilder::demo();
    b.fail_index_reads(0);
    let dir = seeded(&b)?;
    let err = check_dir(dir.path()).unwrap_err();
    assert_eq!(err.failed_task(), Some("Index_0_0"));
    Ok(())
}
