use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use techmd_core::filepath::filepath_map_for;
use techmd_core::models::{
    AudioMetadata, AvMetadata, FileChecksum, FileInfo, FileRecordUpsert, NewFilePart, PartType,
    PdfMetadata, ToolVersions, TrackMetadata, TypeMetadata,
};
use techmd_processing::Identification;

use super::*;
use crate::audit::AuditService;
use crate::test_helpers::{
    toolkit, MemoryFileRecordStore, RecordingNotifier, StaticIdentifier, StubCharacterizer,
};

const DRUID: &str = "druid:bc123df4567";
const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
const BAR_MD5: &str = "c157a79031e1c40f85931829bc5fc552";
const FOO_MD5: &str = "d3b07384d113edec49eaa6238ad5ff00";

struct Fixture {
    dir: TempDir,
    store: MemoryFileRecordStore,
    identifier: StaticIdentifier,
    pdf: StubCharacterizer,
    audio: StubCharacterizer,
    notifier: RecordingNotifier,
}

impl Fixture {
    fn new() -> Self {
        Self::with_identifier(StaticIdentifier::new(Identification::new(
            Some("x-fmt/111"),
            Some("text/plain"),
        )))
    }

    fn with_identifier(identifier: StaticIdentifier) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0001.html"), "").unwrap();
        fs::write(dir.path().join("bar.txt"), "bar\n").unwrap();
        fs::write(dir.path().join("foo.txt"), "foo\n").unwrap();
        Self {
            dir,
            store: MemoryFileRecordStore::new(),
            identifier,
            pdf: StubCharacterizer::pdf(PdfMetadata {
                pages: Some(111),
                ..Default::default()
            }),
            audio: StubCharacterizer::audio(AvMetadata::default(), Vec::new()),
            notifier: RecordingNotifier::new(),
        }
    }

    fn generator(&self) -> TechnicalMetadataGenerator {
        TechnicalMetadataGenerator::new(
            Arc::new(self.store.clone()),
            toolkit(&self.identifier, &[&self.pdf, &self.audio]),
            Arc::new(self.notifier.clone()),
        )
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn map(&self, names: &[&str]) -> Vec<(PathBuf, String)> {
        names
            .iter()
            .map(|name| (self.path(name), name.to_string()))
            .collect()
    }
}

fn seeded(filename: &str, md5: &str, filetype: Option<&str>) -> FileRecordUpsert {
    FileRecordUpsert {
        druid: DRUID.to_string(),
        filename: filename.to_string(),
        md5: md5.to_string(),
        bytes: 0,
        file_modification: None,
        filetype: filetype.map(str::to_string),
        mimetype: None,
        tool_versions: ToolVersions::new(),
        metadata: TypeMetadata::None,
        parts: Vec::new(),
    }
}

#[tokio::test]
async fn test_generates_for_changed_and_new_files() {
    let fixture = Fixture::new();
    fixture.store.seed(seeded("0001.html", EMPTY_MD5, Some("test")));
    fixture
        .store
        .seed(seeded("bar.txt", "xc157a79031e1c40f85931829bc5fc552", Some("test")));

    let report = fixture
        .generator()
        .generate(DRUID, &fixture.map(&["0001.html", "bar.txt", "foo.txt"]), false)
        .await
        .unwrap();

    assert_eq!(report.generated, vec!["bar.txt".to_string(), "foo.txt".to_string()]);
    assert_eq!(report.unchanged, vec!["0001.html".to_string()]);

    let unchanged = fixture.store.get(DRUID, "0001.html").unwrap();
    assert_eq!(unchanged.filetype.as_deref(), Some("test"));

    let bar = fixture.store.get(DRUID, "bar.txt").unwrap();
    assert_eq!(bar.md5, BAR_MD5);
    assert_eq!(bar.bytes, 4);
    assert_eq!(bar.filetype.as_deref(), Some("x-fmt/111"));
    assert!(bar.file_modification.is_some());

    let foo = fixture.store.get(DRUID, "foo.txt").unwrap();
    assert_eq!(foo.md5, FOO_MD5);
    assert_eq!(foo.mimetype.as_deref(), Some("text/plain"));
    assert_eq!(
        foo.tool_versions,
        ToolVersions::from([("siegfried".to_string(), "1.9.1".to_string())])
    );
}

#[tokio::test]
async fn test_zero_byte_files_have_no_identification() {
    let fixture = Fixture::new();
    fixture.write("empty.pdf", b"");

    fixture
        .generator()
        .generate(DRUID, &fixture.map(&["0001.html", "empty.pdf"]), false)
        .await
        .unwrap();

    for filename in ["0001.html", "empty.pdf"] {
        let record = fixture.store.get(DRUID, filename).unwrap();
        assert_eq!(record.md5, EMPTY_MD5);
        assert_eq!(record.bytes, 0);
        assert_eq!(record.filetype, None);
        assert_eq!(record.mimetype, None);
        assert!(record.tool_versions.is_empty());
        assert_eq!(record.metadata, TypeMetadata::None);
    }
    assert_eq!(fixture.identifier.calls(), 0);
}

#[tokio::test]
async fn test_missing_files_abort_before_characterizing() {
    let fixture = Fixture::new();
    fixture.store.seed(seeded("old.txt", EMPTY_MD5, None));

    let err = fixture
        .generator()
        .generate(
            DRUID,
            &fixture.map(&["bar.txt", "does_not_exist.txt", "gone.txt"]),
            false,
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.errors(),
        vec![
            format!("{} not found", fixture.path("does_not_exist.txt").display()),
            format!("{} not found", fixture.path("gone.txt").display()),
        ]
    );
    assert_eq!(fixture.identifier.calls(), 0);
    assert_eq!(fixture.store.apply_calls(), 0);
    assert!(fixture.store.get(DRUID, "old.txt").is_some());
}

#[tokio::test]
async fn test_records_outside_the_file_set_are_deleted() {
    let fixture = Fixture::new();
    fixture.store.seed(seeded("0002.html", "e41d8cd98f00b204e9800998ecf8427e", Some("test")));

    let report = fixture
        .generator()
        .generate(DRUID, &fixture.map(&["0001.html", "bar.txt", "foo.txt"]), false)
        .await
        .unwrap();

    assert_eq!(report.summary.deleted, vec!["0002.html".to_string()]);
    assert!(fixture.store.get(DRUID, "0002.html").is_none());
    assert_eq!(fixture.store.records(DRUID).len(), 3);
}

#[tokio::test]
async fn test_second_run_characterizes_nothing() {
    let fixture = Fixture::new();
    let pdf = fixture.write("doc.pdf", b"%PDF-1.6");
    let identifier = fixture
        .identifier
        .clone()
        .with_file("doc.pdf", Identification::new(Some("fmt/20"), Some("application/pdf")));
    let fixture = Fixture {
        identifier,
        ..fixture
    };
    let map = vec![(pdf, "doc.pdf".to_string())];

    fixture.generator().generate(DRUID, &map, false).await.unwrap();
    let first = fixture.store.records(DRUID);
    assert_eq!(fixture.pdf.calls(), 1);

    let report = fixture.generator().generate(DRUID, &map, false).await.unwrap();

    assert!(report.generated.is_empty());
    assert_eq!(fixture.pdf.calls(), 1);
    assert_eq!(fixture.identifier.calls(), 1);
    assert_eq!(fixture.store.records(DRUID), first);
}

#[tokio::test]
async fn test_force_regenerates_matching_files() {
    let fixture = Fixture::new();
    fixture.store.seed(seeded("bar.txt", BAR_MD5, Some("test")));

    let report = fixture
        .generator()
        .generate(DRUID, &fixture.map(&["bar.txt"]), true)
        .await
        .unwrap();

    assert_eq!(report.generated, vec!["bar.txt".to_string()]);
    assert_eq!(fixture.identifier.calls(), 1);
    let bar = fixture.store.get(DRUID, "bar.txt").unwrap();
    assert_eq!(bar.filetype.as_deref(), Some("x-fmt/111"));
}

#[tokio::test]
async fn test_file_info_with_matching_md5_never_touches_disk() {
    let fixture = Fixture::new();
    fixture.store.seed(seeded("0001.html", EMPTY_MD5, Some("test")));

    let file_infos = vec![FileInfo::new("/not/on/this/host/0001.html", EMPTY_MD5, "0001.html")];
    let report = fixture
        .generator()
        .generate_with_file_info(DRUID, &file_infos, false)
        .await
        .unwrap();

    assert_eq!(report.unchanged, vec!["0001.html".to_string()]);
    assert_eq!(fixture.identifier.calls(), 0);
    assert_eq!(
        fixture.store.get(DRUID, "0001.html").unwrap().filetype.as_deref(),
        Some("test")
    );
}

#[tokio::test]
async fn test_file_info_regenerates_changed_file_only() {
    let fixture = Fixture::new();
    fixture.store.seed(seeded("0001.html", EMPTY_MD5, Some("test")));
    fixture.store.seed(seeded("bar.txt", "stale", None));
    fixture.store.set_filetype(DRUID, "0001.html", Some("fixed-by-hand"));

    let file_infos = vec![
        FileInfo::new("/not/on/this/host/0001.html", EMPTY_MD5, "0001.html"),
        FileInfo::new(fixture.path("bar.txt"), BAR_MD5, "bar.txt"),
    ];
    let report = fixture
        .generator()
        .generate_with_file_info(DRUID, &file_infos, false)
        .await
        .unwrap();

    assert_eq!(report.generated, vec!["bar.txt".to_string()]);
    let bar = fixture.store.get(DRUID, "bar.txt").unwrap();
    assert_eq!(bar.md5, BAR_MD5);
    assert_eq!(bar.filetype.as_deref(), Some("x-fmt/111"));
    assert_eq!(bar.mimetype.as_deref(), Some("text/plain"));
    assert!(bar.tool_versions.contains_key("siegfried"));
    assert_eq!(
        fixture.store.get(DRUID, "0001.html").unwrap().filetype.as_deref(),
        Some("fixed-by-hand")
    );
}

#[tokio::test]
async fn test_file_info_missing_file_is_an_error() {
    let fixture = Fixture::new();
    let file_infos = vec![FileInfo::new("/not/on/this/host/new.txt", FOO_MD5, "new.txt")];

    let err = fixture
        .generator()
        .generate_with_file_info(DRUID, &file_infos, false)
        .await
        .unwrap_err();

    assert_eq!(err.errors(), vec!["/not/on/this/host/new.txt not found".to_string()]);
}

#[tokio::test]
async fn test_identifier_failure_aborts_the_batch() {
    let fixture = Fixture::with_identifier(StaticIdentifier::failing("sf exploded"));

    let err = fixture
        .generator()
        .generate(DRUID, &fixture.map(&["bar.txt", "foo.txt"]), false)
        .await
        .unwrap_err();

    assert_eq!(
        err.errors(),
        vec![format!(
            "Error generating for {} ({}): sf exploded",
            fixture.path("bar.txt").display(),
            DRUID
        )]
    );
    assert_eq!(fixture.identifier.calls(), 1);
    assert_eq!(fixture.store.apply_calls(), 0);
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_tolerated_characterization_failure_stores_partial_record() {
    let fixture = Fixture::with_identifier(StaticIdentifier::new(Identification::new(
        Some("fmt/20"),
        Some("application/pdf"),
    )));
    let fixture = Fixture {
        pdf: fixture.pdf.clone().failing(),
        ..fixture
    };
    let pdf = fixture.write("broken.pdf", b"%PDF-1.6 truncated");

    fixture
        .generator()
        .generate(DRUID, &[(pdf, "broken.pdf".to_string())], false)
        .await
        .unwrap();

    let record = fixture.store.get(DRUID, "broken.pdf").unwrap();
    assert_eq!(record.mimetype.as_deref(), Some("application/pdf"));
    assert_eq!(record.metadata, TypeMetadata::None);
    assert_eq!(fixture.notifier.characterization_failures().len(), 1);
}

#[tokio::test]
async fn test_nul_characters_are_stripped() {
    let fixture = Fixture::with_identifier(StaticIdentifier::new(Identification::new(
        Some("fmt/20"),
        Some("application/pdf"),
    )));
    let fixture = Fixture {
        pdf: StubCharacterizer::pdf(PdfMetadata {
            creator: Some("Adobe\u{0} InDesign".to_string()),
            ..Default::default()
        }),
        ..fixture
    };
    let pdf = fixture.write("doc.pdf", b"%PDF-1.6");

    fixture
        .generator()
        .generate(DRUID, &[(pdf, "doc.pdf".to_string())], false)
        .await
        .unwrap();

    let record = fixture.store.get(DRUID, "doc.pdf").unwrap();
    assert_eq!(
        record.metadata.pdf().unwrap().creator.as_deref(),
        Some("Adobe InDesign")
    );
}

#[tokio::test]
async fn test_audio_part_without_levels_keeps_null_volumes() {
    let part = NewFilePart {
        part_id: Some("28470".to_string()),
        format: Some("Vorbis".to_string()),
        metadata: TrackMetadata::Audio(AudioMetadata {
            channels: Some("1".to_string()),
            ..Default::default()
        }),
        ..NewFilePart::new(PartType::Audio)
    };
    let fixture = Fixture::with_identifier(StaticIdentifier::new(Identification::new(
        Some("fmt/203"),
        Some("audio/ogg"),
    )));
    let fixture = Fixture {
        audio: StubCharacterizer::audio(
            AvMetadata {
                audio_count: Some(1),
                ..Default::default()
            },
            vec![part],
        ),
        ..fixture
    };
    let ogg = fixture.write("noam.ogg", b"OggS");

    fixture
        .generator()
        .generate(DRUID, &[(ogg, "noam.ogg".to_string())], false)
        .await
        .unwrap();

    let record = fixture.store.get(DRUID, "noam.ogg").unwrap();
    assert_eq!(record.parts.len(), 1);
    assert_eq!(
        record.tool_versions.get("mediainfo").map(String::as_str),
        Some("v19.09")
    );
    let json = serde_json::to_value(&record.parts[0]).unwrap();
    assert_eq!(json["audio_metadata"]["mean_volume"], serde_json::Value::Null);
    assert!(json["audio_metadata"].as_object().unwrap().contains_key("max_volume"));
}

#[tokio::test]
async fn test_store_failure_is_recoverable() {
    let fixture = Fixture::new();
    fixture.store.fail_apply(true);

    let err = fixture
        .generator()
        .generate(DRUID, &fixture.map(&["bar.txt"]), false)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Store(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_store_lookup_failure_is_recoverable() {
    let fixture = Fixture::new();
    fixture.store.fail_find(true);

    let err = fixture
        .generator()
        .generate(DRUID, &fixture.map(&["bar.txt"]), false)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Store(_)));
    assert!(err.is_recoverable());
    assert_eq!(fixture.store.apply_calls(), 0);
}

#[tokio::test]
async fn test_generated_records_audit_clean() {
    let fixture = Fixture::new();
    fixture.write("dir/nested.txt", b"nested\n");
    let filepaths: Vec<PathBuf> = ["0001.html", "bar.txt", "dir/nested.txt"]
        .iter()
        .map(|name| fixture.path(name))
        .collect();
    let filepath_map = filepath_map_for(&filepaths, fixture.dir.path()).unwrap();

    fixture
        .generator()
        .generate(DRUID, &filepath_map, false)
        .await
        .unwrap();

    let mut expected = Vec::new();
    for (filepath, filename) in &filepath_map {
        let facts = file_facts(Path::new(filepath)).await.unwrap();
        expected.push(FileChecksum::new(filename.clone(), facts.md5));
    }
    let report = AuditService::new(Arc::new(fixture.store.clone()))
        .audit(DRUID, &expected)
        .await
        .unwrap()
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(
        fixture.store.get(DRUID, "dir/nested.txt").map(|r| r.bytes),
        Some(7)
    );
}
