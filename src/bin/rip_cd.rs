use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use cdrip::cd::songs::default_title;
use cdrip::cd::{DiscReader, LibcdioReader};
use cdrip::tagging::FileTagWriter;
use cdrip::transcode::{EncodePreset, FfmpegTranscoder};
use cdrip::{AlbumInfo, Ripper, RipperConfig, RipperEvent};

struct Args {
    device: Option<PathBuf>,
    out_dir: PathBuf,
    preset: EncodePreset,
    album: AlbumInfo,
    tracks: Vec<u8>,
}

fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let argv: Vec<String> = env::args().collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(message) => {
            error!("{}", message);
            print_usage(&argv[0]);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let exit_code = runtime.block_on(rip(args));
    std::process::exit(exit_code);
}

async fn rip(args: Args) -> i32 {
    let mut config = RipperConfig::from_env();
    if args.device.is_some() {
        config.device = args.device.clone();
    }

    let disc = match &config.device {
        Some(path) => LibcdioReader::open(path),
        None => LibcdioReader::open_default(),
    };
    let disc: Arc<dyn DiscReader> = match disc {
        Ok(disc) => Arc::new(disc),
        Err(e) => {
            error!("Failed to open CD drive: {}", e);
            return 1;
        }
    };

    let runtime_handle = tokio::runtime::Handle::current();
    let transcoder = Arc::new(FfmpegTranscoder::new(
        config.ffmpeg_path.clone(),
        config.max_parallel_jobs,
        runtime_handle.clone(),
    ));
    let ripper = Ripper::new(
        disc,
        transcoder,
        Arc::new(FileTagWriter),
        config,
        runtime_handle,
    );

    if !ripper.check_disc_is_valid() {
        error!("No audio disc in drive");
        return 1;
    }

    let contents = match ripper.disc_contents() {
        Ok(contents) => contents,
        Err(e) => {
            error!("Failed to read disc contents: {}", e);
            return 1;
        }
    };
    for song in &contents.songs {
        info!(
            "{:2}. {}{} ({}:{:02})",
            song.track_number,
            song.title,
            song.artist
                .as_deref()
                .map(|a| format!(" - {}", a))
                .unwrap_or_default(),
            song.duration.as_secs() / 60,
            song.duration.as_secs() % 60
        );
    }

    let tracks: Vec<u8> = if args.tracks.is_empty() {
        contents.songs.iter().map(|s| s.track_number).collect()
    } else {
        args.tracks.clone()
    };

    for number in tracks {
        let title = contents
            .song(number)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| default_title(number));
        let file_name = format!("{:02}.{}", number, args.preset.extension());
        ripper.add_track(
            number,
            &title,
            args.out_dir.join(file_name),
            args.preset.clone(),
        );
    }
    if ripper.added_tracks() == 0 {
        error!(
            "None of the requested tracks exist on the disc ({} tracks)",
            contents.songs.len()
        );
        return 1;
    }

    let album = merge_album(contents.album, args.album, &args.preset);
    ripper.set_album_information(album);

    let mut events = ripper.subscribe();
    if let Err(e) = ripper.start() {
        error!("Failed to start rip: {}", e);
        return 1;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(RipperEvent::ProgressUpdated(percent)) => info!("Progress: {}%", percent),
                Some(RipperEvent::StateChanged(state)) => info!("State: {:?}", state),
                Some(RipperEvent::Finished(summary)) => {
                    info!(
                        "Done: {} succeeded, {} failed, {} tagged ({} tag failures)",
                        summary.finished_success,
                        summary.finished_failed,
                        summary.files_tagged,
                        summary.tag_failures
                    );
                    return if summary.finished_failed > 0 { 2 } else { 0 };
                }
                Some(RipperEvent::Cancelled) => {
                    warn!("Rip cancelled");
                    return 130;
                }
                Some(_) => {}
                None => return 1,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, cancelling after the current step");
                ripper.cancel();
            }
        }
    }
}

/// Album fields given on the command line win over CD-Text
fn merge_album(from_disc: AlbumInfo, from_args: AlbumInfo, preset: &EncodePreset) -> AlbumInfo {
    let pick = |arg: String, disc: String| if arg.is_empty() { disc } else { arg };
    AlbumInfo {
        album: pick(from_args.album, from_disc.album),
        artist: pick(from_args.artist, from_disc.artist),
        genre: pick(from_args.genre, from_disc.genre),
        year: from_args.year,
        disc: from_args.disc,
        container_type: preset.container,
    }
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut args = Args {
        device: None,
        out_dir: PathBuf::new(),
        preset: EncodePreset::flac(),
        album: AlbumInfo::default(),
        tracks: Vec::new(),
    };
    let mut out_dir = None;

    let mut i = 1;
    while i < argv.len() {
        let flag = argv[i].as_str();
        if !flag.starts_with("--") {
            let number = flag
                .parse::<u8>()
                .map_err(|_| format!("Invalid track number: {}", flag))?;
            args.tracks.push(number);
            i += 1;
            continue;
        }

        let value = argv
            .get(i + 1)
            .ok_or_else(|| format!("{} requires a value", flag))?
            .clone();
        match flag {
            "--device" => args.device = Some(PathBuf::from(value)),
            "--out" => out_dir = Some(PathBuf::from(value)),
            "--format" => {
                args.preset = match value.as_str() {
                    "flac" => EncodePreset::flac(),
                    "mp3" => EncodePreset::mp3_vbr(2),
                    "ogg" => EncodePreset::ogg_vorbis(6),
                    other => return Err(format!("Unknown format: {}", other)),
                }
            }
            "--album" => args.album.album = value,
            "--artist" => args.album.artist = value,
            "--genre" => args.album.genre = value,
            "--year" => {
                args.album.year = value
                    .parse()
                    .map_err(|_| format!("Invalid year: {}", value))?
            }
            "--disc" => {
                args.album.disc = value
                    .parse()
                    .map_err(|_| format!("Invalid disc number: {}", value))?
            }
            _ => return Err(format!("Unknown argument: {}", flag)),
        }
        i += 2;
    }

    args.out_dir = out_dir.ok_or_else(|| "--out is required".to_string())?;
    Ok(args)
}

fn print_usage(program: &str) {
    eprintln!(
        "Usage: {} --out DIR [--device PATH] [--format flac|mp3|ogg] \
         [--album A] [--artist A] [--genre G] [--year Y] [--disc N] [TRACK...]",
        program
    );
}
