use std::{env, process::ExitCode};

use quicktime::{QuickTimeParser, Track};
use tracing_subscriber::EnvFilter;

const SAMPLES_SHOWN: u32 = 8;

fn dump_track(parser: &QuickTimeParser<'_>, index: usize, track: &Track) {
    println!(
        "track {} ({:?}): time scale {}, duration {}, {} samples in {} chunks",
        track.track_id,
        track.codec_type,
        track.time_scale,
        track.duration,
        track.sample_count(),
        track.chunk_count()
    );
    if track.width != 0 || track.height != 0 {
        println!("  {}x{}", track.width, track.height);
    }
    for edit in &track.edit_list {
        println!(
            "  edit at {}: {} from media time {} at rate {}",
            edit.time_offset, edit.track_duration, edit.media_time, edit.media_rate
        );
    }
    for desc in &track.sample_descs {
        println!(
            "  {} with {} bytes of extra data",
            desc.codec_tag(),
            desc.extra_data().map_or(0, <[u8]>::len)
        );
    }
    for sample in 0..track.sample_count().min(SAMPLES_SHOWN) {
        match parser.locate_sample(index, sample) {
            Ok(location) => println!(
                "  sample {sample}: offset {}, size {}, time {}{}",
                location.offset,
                location.size,
                location.time,
                if location.keyframe { ", keyframe" } else { "" }
            ),
            Err(error) => println!("  sample {sample}: {error}"),
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: qtdump <movie>");
        return ExitCode::FAILURE;
    };

    let mut parser = QuickTimeParser::new();
    if let Err(error) = parser.load_file(&path) {
        eprintln!("{path}: {error}");
        return ExitCode::FAILURE;
    }

    println!(
        "{path}: time scale {}, duration {}, {} tracks",
        parser.time_scale(),
        parser.duration(),
        parser.tracks().len()
    );
    for (index, track) in parser.tracks().iter().enumerate() {
        dump_track(&parser, index, track);
    }
    ExitCode::SUCCESS
}
