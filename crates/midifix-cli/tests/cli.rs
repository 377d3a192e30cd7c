//! Drive the `midifix` binary end to end.

use assert_cmd::Command;
use midly::{Smf, TrackEventKind};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn midifix(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("midifix").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("MIDIFIX_OUTPUT_DIR")
        .env_remove("MIDIFIX_SUFFIX")
        .env_remove("MIDIFIX_STRATEGY")
        .env_remove("MIDIFIX_OVERFLOW")
        .env_remove("MIDIFIX_PREFIX_POLICY")
        .env_remove("MIDIFIX_RUNNING_STATUS")
        .env_remove("MIDIFIX_LOG_LEVEL");
    cmd
}

/// Title track, then one note each on channels 4 and 9.
fn broken_midi() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&6u32.to_be_bytes());
    bytes.extend_from_slice(&1u16.to_be_bytes());
    bytes.extend_from_slice(&3u16.to_be_bytes());
    bytes.extend_from_slice(&480u16.to_be_bytes());

    let mut title = vec![0x00, 0xFF, 0x03, 0x04];
    title.extend_from_slice(b"Song");
    title.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
    let bass = vec![
        0x00, 0x94, 40, 100, 0x83, 0x60, 0x84, 40, 0, 0x00, 0xFF, 0x2F, 0x00,
    ];
    let drums = vec![
        0x00, 0x99, 36, 100, 0x83, 0x60, 0x89, 36, 0, 0x00, 0xFF, 0x2F, 0x00,
    ];

    for track in [title, bass, drums] {
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);
    }
    bytes
}

#[test]
fn fix_macro_file_writes_labeled_output() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("tune.mml"), "MML@a,b,c;").unwrap();

    midifix(&dir)
        .arg("fix")
        .arg("tune.mml")
        .assert()
        .success()
        .stdout(predicate::str::contains("tune_fix.mml").and(predicate::str::contains("3 channels")));

    assert_eq!(
        fs::read_to_string(dir.path().join("tune_fix.mml")).unwrap(),
        "[Channel1]\nc\n[Channel2]\nb\n[Channel3]\na\n"
    );
}

#[test]
fn fix_midi_file_renumbers_channels() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("song.mid"), broken_midi()).unwrap();

    midifix(&dir)
        .args(["fix", "song.mid", "--out-dir", "out"])
        .assert()
        .success();

    let bytes = fs::read(dir.path().join("out/song_fix.mid")).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 3);

    let channels: Vec<Vec<u8>> = smf
        .tracks
        .iter()
        .map(|track| {
            let mut chans: Vec<u8> = track
                .iter()
                .filter_map(|e| match e.kind {
                    TrackEventKind::Midi { channel, .. } => Some(channel.as_int()),
                    _ => None,
                })
                .collect();
            chans.dedup();
            chans
        })
        .collect();
    assert_eq!(channels, vec![vec![], vec![0], vec![1]]);
}

#[test]
fn unknown_format_fails_but_other_files_still_run() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), "just some text").unwrap();
    fs::write(dir.path().join("tune.mml"), "MML@x,y;").unwrap();

    midifix(&dir)
        .args(["fix", "notes.txt", "tune.mml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized input format"));

    assert!(dir.path().join("tune_fix.mml").exists());
    assert!(!dir.path().join("notes_fix.mml").exists());
    assert!(!dir.path().join("notes_fix.txt").exists());
}

#[test]
fn prefix_policy_flag_overrides_default() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("plain.mml"), "x,y;").unwrap();

    midifix(&dir)
        .args(["fix", "plain.mml", "--prefix-policy", "require"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MML@"));
}

#[test]
fn local_config_file_sets_suffix() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("midifix.toml"), "[output]\nsuffix = \"_tidy\"\n").unwrap();
    fs::write(dir.path().join("tune.mml"), "MML@a;").unwrap();

    midifix(&dir).args(["fix", "tune.mml"]).assert().success();

    assert!(dir.path().join("tune_tidy.mml").exists());
}

#[test]
fn config_subcommand_prints_toml() {
    let dir = TempDir::new().unwrap();

    midifix(&dir)
        .env("MIDIFIX_STRATEGY", "channel-union")
        .arg("config")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[reorganize]")
                .and(predicate::str::contains("strategy = \"channel_union\""))
                .and(predicate::str::contains("# env: MIDIFIX_STRATEGY")),
        );
}

#[test]
fn bad_strategy_is_a_usage_error() {
    let dir = TempDir::new().unwrap();

    midifix(&dir)
        .args(["fix", "x.mid", "--strategy", "shuffle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("shuffle"));
}
