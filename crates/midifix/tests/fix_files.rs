//! End-to-end fixes through the filesystem.

use midifix::pipeline::{fix_file, FixOptions, InputFormat};
use midifix::writer::{to_smf_bytes, WriteOptions};
use midifix::{
    loader, mml, Channel, Chunk, Event, PrefixPolicy, Sequence, TempoChange, TempoMap, TimedEvent,
    Timing,
};
use midly::{MetaMessage, MidiMessage, Smf, TrackEventKind};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

fn note(tick: u64, channel: u8, pitch: u8) -> TimedEvent {
    TimedEvent::new(
        tick,
        Event::Note {
            channel: Channel(channel),
            pitch,
            velocity: 100,
            duration: 480,
        },
    )
}

/// Three tracks: title, bass on ch5 with a program change, drums on ch9.
fn broken_song() -> Sequence {
    Sequence::new(
        Timing::Metrical(480),
        TempoMap {
            tempo_changes: vec![TempoChange {
                tick: 0,
                microseconds_per_beat: 400_000,
            }],
            time_signatures: vec![],
        },
        vec![
            Chunk::from_events(vec![TimedEvent::track_name(0, "Song")]),
            Chunk::from_events(vec![
                TimedEvent::track_name(0, "Bass"),
                TimedEvent::program_change(0, Channel(5), 33),
                note(0, 5, 40),
                note(480, 5, 43),
            ]),
            Chunk::from_events(vec![note(0, 9, 36), note(960, 9, 38)]),
        ],
    )
}

fn options_for(dir: &TempDir) -> FixOptions {
    FixOptions {
        out_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn midi_fix_writes_renumbered_tracks() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("broken.mid");
    fs::write(&input, to_smf_bytes(&broken_song(), &WriteOptions::default())).unwrap();

    let report = fix_file(&input, &options_for(&dir)).unwrap();

    assert_eq!(report.format, InputFormat::Midi);
    assert_eq!(report.output, dir.path().join("broken_fix.mid"));
    assert_eq!(report.channels, 2);

    let bytes = fs::read(&report.output).unwrap();
    let smf = Smf::parse(&bytes).expect("fixed file should parse");
    assert_eq!(smf.header.format, midly::Format::Parallel);
    assert_eq!(smf.tracks.len(), 3);

    for (index, track) in smf.tracks.iter().enumerate().skip(1) {
        let expected = (index - 1) as u8;
        for event in track {
            if let TrackEventKind::Midi { channel, .. } = event.kind {
                assert_eq!(channel.as_int(), expected, "track {}", index);
            }
        }
    }

    let has_tempo = smf.tracks[0].iter().any(|e| {
        matches!(e.kind, TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 400_000)
    });
    assert!(has_tempo);

    let programs: Vec<u8> = smf.tracks[1]
        .iter()
        .filter_map(|e| match e.kind {
            TrackEventKind::Midi {
                message: MidiMessage::ProgramChange { program },
                ..
            } => Some(program.as_int()),
            _ => None,
        })
        .collect();
    assert_eq!(programs, vec![33]);
}

#[test]
fn reloading_the_fix_gives_the_reorganized_model() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("song.midi");
    fs::write(&input, to_smf_bytes(&broken_song(), &WriteOptions::default())).unwrap();

    let report = fix_file(&input, &options_for(&dir)).unwrap();
    assert_eq!(report.output, dir.path().join("song_fix.midi"));

    let reloaded = loader::load(&report.output).unwrap();
    let expected = midifix::reorganize(&broken_song()).unwrap();

    assert_eq!(reloaded.tempo_map, expected.tempo_map);
    assert_eq!(reloaded.chunks.len(), expected.chunks.len());
    for (got, want) in reloaded.chunks.iter().zip(&expected.chunks) {
        assert_eq!(got.notes(), want.notes());
        assert_eq!(got.channels(), want.channels());
    }
}

#[test]
fn macro_fix_writes_labeled_blocks() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("tune.mml");
    fs::write(&input, "MML@t120cde,l8efg,o3c;").unwrap();

    let report = fix_file(&input, &options_for(&dir)).unwrap();

    assert_eq!(report.format, InputFormat::Macro);
    assert_eq!(report.channels, 3);
    assert_eq!(
        fs::read_to_string(dir.path().join("tune_fix.mml")).unwrap(),
        "[Channel1]\no3c\n[Channel2]\nl8efg\n[Channel3]\nt120cde\n"
    );
}

#[test]
fn macro_fix_respects_require_policy() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("plain.mml");
    fs::write(&input, "cde,efg;").unwrap();

    let mut options = options_for(&dir);
    options.split.prefix_policy = PrefixPolicy::Require;

    let err = fix_file(&input, &options).unwrap_err();
    assert!(matches!(err, midifix::Error::MissingPrefix { .. }));
    assert!(!dir.path().join("plain_fix.mml").exists());
}

#[test]
fn macro_split_reverses_segments() {
    let raw = "MML@one,two,three,four;";
    let text = mml::split(raw);

    assert_eq!(text.len(), 4);
    assert_eq!(text.blocks[0].channel, 1);
    assert_eq!(text.blocks[0].body, "four");
    assert_eq!(text.blocks[3].channel, 4);
    assert_eq!(text.blocks[3].body, "one");

    let mut restored: Vec<&str> = text.segments().collect();
    restored.reverse();
    assert_eq!(restored, vec!["one", "two", "three", "four"]);
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let err = fix_file(&dir.path().join("nope.mid"), &options_for(&dir)).unwrap_err();
    assert!(matches!(err, midifix::Error::Io { .. }));
}
