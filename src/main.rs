use log::{debug, info, warn};
use std::env;
use std::path::PathBuf;
use zblorb::blorb_map::Usage;
use zblorb::media::{picture_size, sample_info, PictureKind, SoundKind};
use zblorb::util::read_be_u16;
use zblorb::{BlorbError, LocatedStory, LocatorConfig, ResourceLoader, StoryLocator};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("zblorb");

    // No story given: print usage and exit successfully
    if args.len() < 2 {
        print_usage(program);
        return Ok(());
    }

    let cli = match parse_args(&args[1..]) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            eprintln!();
            print_usage(program);
            std::process::exit(1);
        }
    };
    let story_path = cli.story.as_path();

    let config = match &cli.config {
        Some(path) => match LocatorConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => LocatorConfig::default(),
    };
    debug!("Locator configuration: {:?}", config);

    let locator = StoryLocator::with_config(config);
    let mut located = match locator.locate(story_path) {
        Ok(located) => located,
        Err(BlorbError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("Error: Story file not found: {}", story_path.display());
            eprintln!();
            eprintln!("Please check:");
            eprintln!("• File path is correct");
            eprintln!("• You're running from the right directory");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    report_story(&mut located)?;
    match &located.resources {
        Some(loader) => report_resources(loader, &locator),
        None => println!("Media: none"),
    }
    Ok(())
}

struct CliArgs {
    story: PathBuf,
    config: Option<PathBuf>,
}

fn print_usage(program: &str) {
    println!("zblorb - locate the Z-code and media of a story file");
    println!();
    println!("Usage: {} <story_file> [--config locator.toml]", program);
    println!("Examples:");
    println!("  {} mystory.z5", program);
    println!("  {} mystory.zblorb --config locator.toml", program);
    println!();
    println!("A naked story picks up pictures and sounds from a Blorb file with the");
    println!("same name and a .blb or .zblorb extension.");
}

/// Parse everything after the program name
fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let (story, rest) = args.split_first().ok_or("no story file given")?;
    if story.starts_with("--") {
        return Err(format!("expected a story file, found option {}", story));
    }

    let config = match rest {
        [] => None,
        [flag, path] if flag == "--config" => Some(PathBuf::from(path)),
        [flag] if flag == "--config" => return Err("--config needs a file name".to_string()),
        [other, ..] => return Err(format!("unexpected argument: {}", other)),
    };

    Ok(CliArgs {
        story: PathBuf::from(story),
        config,
    })
}

fn report_story(located: &mut LocatedStory) -> Result<(), Box<dyn std::error::Error>> {
    let story = located.stream.read_story()?;
    let version = story[0];
    let release = read_be_u16(&story[2..4]);
    let serial = String::from_utf8_lossy(&story[18..24]).into_owned();

    if located.exec_in_blorb {
        println!(
            "Story: Z-code chunk at {:#x} in the Blorb file",
            located.stream.start_offset()
        );
    } else {
        println!("Story: naked Z-code file");
    }
    println!("  version {}, release {}, serial {}", version, release, serial);
    println!("  {} bytes", story.len());
    info!("Story stream positioned at {}", located.stream.tell());
    Ok(())
}

fn report_resources(loader: &ResourceLoader, locator: &StoryLocator) {
    let map = loader.map();
    if let Some(path) = loader.path() {
        println!("Media: {}", path.display());
    }

    for usage in [Usage::Pict, Usage::Snd, Usage::Data, Usage::Exec] {
        if let Some((count, min, max)) = map.count_resources(usage) {
            println!("  {:<4} {} (numbers {}..={})", usage, count, min, max);
        }
    }
    if let Some(release) = map.release_number() {
        println!("  release number {}", release);
    }
    if let Some(picture) = map.frontispiece() {
        println!("  frontispiece: picture {}", picture);
    }
    if let Some(text) = map.metadata() {
        println!("  iFiction metadata: {} bytes", text.len());
    }

    let method = locator.config().resource_method;
    for entry in map.resources() {
        let mut resource = match loader.load_chunk(entry.chunk_index, method) {
            Ok(resource) => resource,
            Err(e) => {
                warn!("{} {}: {}", entry.usage, entry.number, e);
                continue;
            }
        };
        match entry.usage {
            Usage::Pict if PictureKind::from_chunk_type(&resource.chunk_type).is_some() => {
                match picture_size(&mut resource) {
                    Ok(Some((width, height))) => {
                        println!("  Pict {:>3}: {}x{}", entry.number, width, height)
                    }
                    Ok(None) => println!("  Pict {:>3}: size unknown", entry.number),
                    Err(e) => warn!("Pict {}: {}", entry.number, e),
                }
            }
            Usage::Snd
                if SoundKind::from_chunk_type(&resource.chunk_type) == Some(SoundKind::Aiff) =>
            {
                match sample_info(&mut resource) {
                    Ok(sample) => println!(
                        "  Snd  {:>3}: AIFF, {} channel(s), {} frames at {} Hz",
                        entry.number, sample.channels, sample.frames, sample.rate
                    ),
                    Err(e) => warn!("Snd {}: {}", entry.number, e),
                }
            }
            _ => debug!("{} {}: {} bytes", entry.usage, entry.number, resource.len()),
        }
        resource.release();
    }
}
