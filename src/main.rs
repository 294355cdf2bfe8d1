//! soundboard-rs - live-performance soundboard
//!
//! Loads the clips given on the command line, opens an output device and
//! reads operator commands from stdin.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;

use soundboard::audio::{self, Clip};
use soundboard::playback::ms_to_frames;
use soundboard::{PlaybackError, Settings, StreamController};

#[derive(Parser, Debug)]
#[command(name = "soundboard-rs", version, about = "Cue audio clips to an output device")]
struct Args {
    /// Output device name (defaults to the saved device, then the first one found)
    #[arg(short, long)]
    device: Option<String>,

    /// Print the available output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Master volume (1.0 = unity)
    #[arg(long)]
    volume: Option<f32>,

    /// Fade-in length for `play`, in milliseconds
    #[arg(long)]
    fade_in_ms: Option<u32>,

    /// Fade-out length for `stop`, in milliseconds
    #[arg(long)]
    fade_out_ms: Option<u32>,

    /// Clip played on the aux outputs alongside every main clip
    #[arg(long)]
    aux: Option<PathBuf>,

    /// Stop at the end of each clip instead of chaining into the queue
    #[arg(long)]
    auto_stop: bool,

    /// Write the effective device/volume/fade settings back to disk
    #[arg(long)]
    save_settings: bool,

    /// Audio files to load
    files: Vec<PathBuf>,
}

const HELP: &str = "\
commands:
  <n> | q <n>   queue clip n
  p [ms]        play (optional fade-in)
  s [ms]        stop (optional fade-out, 0 = immediate)
  a             abort
  c             clear the active clip
  v <volume>    set master volume
  d             refresh and list devices
  o <device>    open another device
  i             status
  l             list clips
  x             quit";

fn main() {
    env_logger::init();
    log::info!("Starting soundboard-rs");

    let args = Args::parse();
    let mut settings = Settings::load();
    if let Some(device) = &args.device {
        settings.device = Some(device.clone());
    }
    if let Some(volume) = args.volume {
        settings.volume = volume;
    }
    if let Some(ms) = args.fade_in_ms {
        settings.fade_in_ms = ms;
    }
    if let Some(ms) = args.fade_out_ms {
        settings.fade_out_ms = ms;
    }

    let mut controller = StreamController::with_default_host();

    if args.list_devices {
        for name in controller.list_devices() {
            println!("{}", name);
        }
        return;
    }

    let aux = args.aux.as_ref().and_then(|path| match audio::load_clip(path) {
        Ok(clip) => Some(Arc::new(clip)),
        Err(e) => {
            log::error!("Failed to load aux clip {}: {}", path.display(), e);
            None
        }
    });

    let clips: Vec<Arc<Clip>> = args
        .files
        .iter()
        .map(|path| {
            let clip = audio::load_clip(path).unwrap_or_else(|e| {
                log::error!("Failed to load {}: {}", path.display(), e);
                Clip::without_buffer(path.display().to_string())
            });
            Arc::new(
                clip.with_auto_stop(args.auto_stop)
                    .with_paired_aux(aux.clone()),
            )
        })
        .collect();

    let device = settings
        .device
        .clone()
        .or_else(|| controller.list_devices().into_iter().next());
    let Some(device) = device else {
        log::error!("No output devices found");
        return;
    };
    if !controller.open_device(&device) {
        return;
    }
    controller.set_volume(settings.volume);

    let (_id, events) = controller.subscribe();
    thread::spawn(move || {
        for event in events {
            log::info!("{:?}", event);
        }
    });

    if args.save_settings {
        settings.device = Some(device);
        settings.save();
    }

    list_clips(&clips);
    println!("{}", HELP);
    run(&mut controller, &clips, &settings);
    controller.close();
}

/// Read and execute operator commands until `x` or end of input
fn run(
    controller: &mut StreamController<soundboard::CpalHost>,
    clips: &[Arc<Clip>],
    settings: &Settings,
) {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let arg = words.next();
        let ms = |default: u32| arg.and_then(|a| a.parse().ok()).unwrap_or(default);

        let result: Result<(), PlaybackError> = match command {
            "q" => queue(controller, clips, arg),
            "p" => controller.start(ms_to_frames(ms(settings.fade_in_ms))),
            "s" => controller.stop(ms_to_frames(ms(settings.fade_out_ms))),
            "a" => controller.abort(),
            "c" => {
                controller.clear_active_track();
                Ok(())
            }
            "v" => {
                match arg.and_then(|a| a.parse::<f32>().ok()) {
                    Some(volume) => controller.set_volume(volume),
                    None => println!("volume: {:.2}", controller.volume()),
                }
                Ok(())
            }
            "d" => {
                for name in controller.refresh_devices() {
                    println!("{}", name);
                }
                Ok(())
            }
            "o" => {
                let name = line.trim_start()[1..].trim();
                if controller.open_device(name) {
                    Ok(())
                } else {
                    Err(PlaybackError::DeviceUnavailable(name.to_string()))
                }
            }
            "i" => {
                print_status(controller);
                Ok(())
            }
            "l" => {
                list_clips(clips);
                Ok(())
            }
            "x" => break,
            "h" | "?" => {
                println!("{}", HELP);
                Ok(())
            }
            other => queue(controller, clips, Some(other)),
        };

        if let Err(e) = result {
            println!("error: {}", e);
        }
    }
}

fn queue(
    controller: &StreamController<soundboard::CpalHost>,
    clips: &[Arc<Clip>],
    arg: Option<&str>,
) -> Result<(), PlaybackError> {
    let Some(clip) = arg
        .and_then(|a| a.parse::<usize>().ok())
        .and_then(|n| clips.get(n))
    else {
        println!("unknown command or clip, `h` for help");
        return Ok(());
    };

    if !clip.is_playable() {
        return Err(PlaybackError::UnplayableClip(clip.name().to_string()));
    }
    controller.queue_clip(Arc::clone(clip));
    Ok(())
}

fn print_status(controller: &StreamController<soundboard::CpalHost>) {
    println!(
        "device: {} ({} ch), state: {:?}, volume: {:.2}",
        controller.current_device().unwrap_or("none"),
        controller.out_channels().unwrap_or(0),
        controller.state(),
        controller.volume()
    );
    println!(
        "active: {} @ {}, queued: {}",
        controller
            .active_track()
            .map_or_else(|| "-".to_string(), |c| c.name().to_string()),
        controller.active_sample_offset(),
        controller
            .queued_track()
            .map_or_else(|| "-".to_string(), |c| c.name().to_string()),
    );
}

fn list_clips(clips: &[Arc<Clip>]) {
    for (i, clip) in clips.iter().enumerate() {
        let frames = clip.buffer().map_or(0, |b| b.frames());
        println!(
            "{:>3}  {}  ({:.1}s{})",
            i,
            clip.name(),
            frames as f32 / soundboard::playback::SAMPLE_RATE as f32,
            if clip.is_playable() { "" } else { ", unplayable" }
        );
    }
}
