//! Integration tests for the archive normalizer: gzip archives on disk in,
//! JSON lines out.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use archive_normalizer::{Config, Inputs, OutputLayout, Pipeline, Sink};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

fn write_gz(dir: &Path, name: &str, body: &str) -> PathBuf {
  fs::create_dir_all(dir).unwrap();
  let path = dir.join(name);
  let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
  enc.write_all(body.as_bytes()).unwrap();
  enc.finish().unwrap();
  path
}

fn read_lines(path: &Path) -> Vec<Value> {
  let mut text = String::new();
  MultiGzDecoder::new(File::open(path).unwrap())
    .read_to_string(&mut text)
    .unwrap();
  text
    .lines()
    .map(|l| serde_json::from_str(l).unwrap())
    .collect()
}

const PUBLIC: &str = r#"{"type":"PublicEvent","id":"1","created_at":"2015-06-01T00:00:00Z","repo":{"name":"acme/widget"},"actor":{"login":"bob"},"payload":{}}"#;

const LEGACY_HEADER: &str =
  "type,created_at,actor,repository_organization,repository_name,repository_owner,url,payload_ref,payload_head,payload_size";

fn new_inputs(dir: &Path) -> Inputs {
  Inputs {
    new_dir: Some(dir.to_path_buf()),
    ..Inputs::default()
  }
}

#[test]
fn single_public_event_end_to_end() {
  let tmp = tempfile::tempdir().unwrap();
  let input = tmp.path().join("in");
  let output = tmp.path().join("out");
  write_gz(&input, "2015-06-01-0.json.gz", &format!("{}\n", PUBLIC));

  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let stats = Pipeline::with_defaults()
    .run_archives(&new_inputs(&input), &mut sink)
    .unwrap();

  assert_eq!(stats.total, 1);
  assert_eq!(stats.count, 1);

  let lines = read_lines(&output.join("2015-06-01-0-processed.json.gz"));
  assert_eq!(lines.len(), 1);
  let doc = &lines[0];
  assert_eq!(doc["type"], "PublicEvent");
  assert_eq!(doc["repo"], "acme/widget");
  assert_eq!(doc["actor"], "bob");
  assert_eq!(doc["created_at"], "2015-06-01T00:00:00+00:00");
}

#[test]
fn outputs_rotate_per_input_file() {
  let tmp = tempfile::tempdir().unwrap();
  let input = tmp.path().join("in");
  let output = tmp.path().join("out");
  write_gz(&input, "2015-06-01-0.json.gz", &format!("{}\n", PUBLIC));
  write_gz(
    &input,
    "2015-06-01-1.json.gz",
    &format!("{}\n{}\n", PUBLIC.replace("acme/widget", "acme/gadget"), PUBLIC.replace("acme/widget", "acme/gadget")),
  );

  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let stats = Pipeline::with_defaults()
    .run_archives(&new_inputs(&input), &mut sink)
    .unwrap();
  assert_eq!(stats.count, 3);

  let first = read_lines(&output.join("2015-06-01-0-processed.json.gz"));
  let second = read_lines(&output.join("2015-06-01-1-processed.json.gz"));
  assert_eq!(first.len(), 1);
  assert_eq!(second.len(), 2);
  assert!(first.iter().all(|d| d["repo"] == "acme/widget"));
  assert!(second.iter().all(|d| d["repo"] == "acme/gadget"));
}

#[test]
fn second_run_skips_processed_files() {
  let tmp = tempfile::tempdir().unwrap();
  let input = tmp.path().join("in");
  let output = tmp.path().join("out");
  write_gz(&input, "a.json.gz", &format!("{}\n", PUBLIC));
  write_gz(&input, "b.json.gz", &format!("{}\n{}\n", PUBLIC, PUBLIC));

  let pipeline = Pipeline::with_defaults();
  let inputs = new_inputs(&input);

  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let first = pipeline.run_archives(&inputs, &mut sink).unwrap();
  assert_eq!(first.count, 3);

  let before: Vec<Vec<u8>> = ["a-processed.json.gz", "b-processed.json.gz"]
    .iter()
    .map(|n| fs::read(output.join(n)).unwrap())
    .collect();

  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let second = pipeline.run_archives(&inputs, &mut sink).unwrap();
  assert_eq!(second.total, 0);
  assert_eq!(second.count, 0);
  assert_eq!(sink.records_written(), 0);

  let after: Vec<Vec<u8>> = ["a-processed.json.gz", "b-processed.json.gz"]
    .iter()
    .map(|n| fs::read(output.join(n)).unwrap())
    .collect();
  assert_eq!(before, after);
}

#[test]
fn only_new_inputs_are_processed_on_rerun() {
  let tmp = tempfile::tempdir().unwrap();
  let input = tmp.path().join("in");
  let output = tmp.path().join("out");
  write_gz(&input, "a.json.gz", &format!("{}\n", PUBLIC));

  let pipeline = Pipeline::with_defaults();
  let inputs = new_inputs(&input);
  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  pipeline.run_archives(&inputs, &mut sink).unwrap();

  write_gz(&input, "b.json.gz", &format!("{}\n", PUBLIC));
  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let stats = pipeline.run_archives(&inputs, &mut sink).unwrap();
  assert_eq!(stats.count, 1);
  assert_eq!(read_lines(&output.join("b-processed.json.gz")).len(), 1);
}

#[test]
fn legacy_and_new_archives_agree_on_the_same_event() {
  let tmp = tempfile::tempdir().unwrap();
  let legacy = tmp.path().join("legacy");
  let new = tmp.path().join("new");
  let output = tmp.path().join("out");

  write_gz(
    &legacy,
    "2014-12-31.csv.gz",
    &format!(
      "{}\nPushEvent,2014-12-31 23:59:59,bob,acme,widget,acme,https://github.com/acme/widget,refs/heads/main,bbb,2\n",
      LEGACY_HEADER
    ),
  );
  write_gz(
    &new,
    "2014-12-31-23.json.gz",
    r#"{"type":"PushEvent","id":"9","created_at":"2014-12-31T23:59:59Z","actor":{"login":"bob"},"repo":{"name":"acme/widget"},"org":{"login":"acme"},"payload":{"ref":"refs/heads/main","head":"bbb","before":"aaa","size":2,"distinct_size":2}}
"#,
  );

  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let stats = Pipeline::with_defaults()
    .run_archives(
      &Inputs {
        legacy_dir: Some(legacy),
        new_dir: Some(new),
        only: Vec::new(),
      },
      &mut sink,
    )
    .unwrap();
  assert_eq!(stats.count, 2);

  let from_legacy = &read_lines(&output.join("2014-12-31-processed.json.gz"))[0];
  let from_new = &read_lines(&output.join("2014-12-31-23-processed.json.gz"))[0];
  for field in ["type", "created_at", "repo", "actor", "org", "ref", "head", "commit_count"] {
    assert_eq!(from_legacy[field], from_new[field], "field {} differs", field);
  }
  assert_eq!(from_legacy["distinct_count"], 2);
  assert_eq!(from_new["distinct_commit_count"], 2);
}

#[test]
fn legacy_and_new_inputs_with_one_base_name_keep_every_record() {
  let tmp = tempfile::tempdir().unwrap();
  let legacy = tmp.path().join("legacy");
  let new = tmp.path().join("new");
  let output = tmp.path().join("out");

  write_gz(
    &legacy,
    "2014-12-31-23.csv.gz",
    &format!(
      "{}\nPublicEvent,2014-12-31 23:00:00,bob,,widget,acme,,,,\n",
      LEGACY_HEADER
    ),
  );
  write_gz(
    &new,
    "2014-12-31-23.json.gz",
    &format!("{}\n", PUBLIC.replace("acme/widget", "acme/gadget")),
  );

  let inputs = Inputs {
    legacy_dir: Some(legacy),
    new_dir: Some(new),
    only: Vec::new(),
  };
  let pipeline = Pipeline::with_defaults();
  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let stats = pipeline.run_archives(&inputs, &mut sink).unwrap();
  assert_eq!(stats.count, 2);

  let shared = output.join("2014-12-31-23-processed.json.gz");
  let lines = read_lines(&shared);
  assert_eq!(lines.len(), 2);
  assert_eq!(lines[0]["repo"], "acme/widget");
  assert_eq!(lines[1]["repo"], "acme/gadget");

  // Both inputs count as processed on the next run.
  let before = fs::read(&shared).unwrap();
  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let rerun = pipeline.run_archives(&inputs, &mut sink).unwrap();
  assert_eq!(rerun.total, 0);
  assert_eq!(fs::read(&shared).unwrap(), before);
}

#[test]
fn bad_records_are_counted_and_never_abort_the_run() {
  let tmp = tempfile::tempdir().unwrap();
  let legacy = tmp.path().join("legacy");
  let new = tmp.path().join("new");
  let output = tmp.path().join("out");

  write_gz(
    &legacy,
    "2014.csv.gz",
    &format!(
      "{}\n\
       PublicEvent,2014-01-01 00:00:00,bob,,,,,,,\n\
       PublicEvent,2014-01-01 00:00:00,bob,,wid get,acme,,,,\n\
       PublicEvent,2014-01-01 00:00:00,bob,,widget,acme,,,,\n",
      LEGACY_HEADER
    ),
  );
  write_gz(
    &new,
    "2015.json.gz",
    &format!(
      "{}\nnot json\n{{\"type\":\"WatchEvent\",\"created_at\":\"2015-06-01T00:00:00Z\",\"repo\":{{\"name\":\"a/b\"}}}}\n{{\"type\":\"PublicEvent\",\"created_at\":\"whenever\",\"repo\":{{\"name\":\"a/b\"}}}}\n",
      PUBLIC
    ),
  );

  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let stats = Pipeline::new(Config {
    progress_interval: 2,
    ..Config::default()
  })
  .run_archives(
    &Inputs {
      legacy_dir: Some(legacy),
      new_dir: Some(new),
      only: Vec::new(),
    },
    &mut sink,
  )
  .unwrap();

  assert_eq!(stats.total, 7);
  assert_eq!(stats.count, 2);
  // missing repo, undecodable line, bad timestamp
  assert_eq!(stats.invalid, 3);
  // "acme/wid get" fails the repo-name invariant
  assert_eq!(stats.process_error, 1);
  assert_eq!(stats.unregistered, 1);
  assert!(stats.is_balanced());
}

#[test]
fn type_allow_list_filters_before_counting() {
  let tmp = tempfile::tempdir().unwrap();
  let input = tmp.path().join("in");
  let output = tmp.path().join("out");
  write_gz(
    &input,
    "a.json.gz",
    &format!(
      "{}\n{}\n",
      PUBLIC,
      r#"{"type":"MemberEvent","created_at":"2015-06-01T00:00:00Z","repo":{"name":"acme/widget"},"payload":{"action":"added","member":{"login":"Eve"}}}"#
    ),
  );

  let mut sink = Sink::directory(OutputLayout::new(&output)).unwrap();
  let stats = Pipeline::with_defaults()
    .run_archives(
      &Inputs {
        new_dir: Some(input),
        only: vec!["MemberEvent".into()],
        ..Inputs::default()
      },
      &mut sink,
    )
    .unwrap();

  assert_eq!(stats.total, 1);
  let lines = read_lines(&output.join("a-processed.json.gz"));
  assert_eq!(lines.len(), 1);
  assert_eq!(lines[0]["type"], "MemberEvent");
  assert_eq!(lines[0]["member_lower"], "eve");
}
