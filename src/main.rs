#[cfg(not(all(feature = "synth-format", feature = "export-wav")))]
fn main() {
    eprintln!(
        "The jagsynth CLI requires the \"synth-format\" and \"export-wav\" features. Rebuild with default features to enable it."
    );
}

#[cfg(all(feature = "synth-format", feature = "export-wav"))]
mod cli {
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    use anyhow::{bail, Context, Result};

    use jagsynth::{codec, export_to_wav, Decimator, BASE_SAMPLE_RATE};

    const USAGE: &str = "\
Usage: jagsynth <input.synth> [output.wav] [options]

Renders a binary synth sound effect to a mono 8-bit WAV file.

Options:
  --rate <hz>   Resample the mixed output to <hz> (default: 22050)
  --trim        Strip the start delay shared by every instrument
  --inspect     Print the decoded parameters as JSON and exit
  -h, --help    Show this help";

    struct CliArgs {
        input: PathBuf,
        output: Option<PathBuf>,
        rate: i32,
        trim: bool,
        inspect: bool,
    }

    fn parse_args() -> Result<Option<CliArgs>> {
        let mut input = None;
        let mut output = None;
        let mut rate = BASE_SAMPLE_RATE;
        let mut trim = false;
        let mut inspect = false;

        let mut args = env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--inspect" => inspect = true,
                "--trim" => trim = true,
                "--rate" => {
                    let value = args.next().context("--rate needs a value")?;
                    rate = value
                        .parse()
                        .with_context(|| format!("invalid rate '{value}'"))?;
                    if rate <= 0 {
                        bail!("rate must be positive");
                    }
                }
                other if other.starts_with('-') => bail!("unknown option '{other}'"),
                other => {
                    if input.is_none() {
                        input = Some(PathBuf::from(other));
                    } else if output.is_none() {
                        output = Some(PathBuf::from(other));
                    } else {
                        bail!("unexpected argument '{other}'");
                    }
                }
            }
        }

        match input {
            Some(input) => Ok(Some(CliArgs {
                input,
                output,
                rate,
                trim,
                inspect,
            })),
            None => Ok(None),
        }
    }

    pub fn run() -> Result<()> {
        let Some(args) = parse_args()? else {
            println!("{USAGE}");
            return Ok(());
        };

        let data = fs::read(&args.input)
            .with_context(|| format!("reading {}", args.input.display()))?;
        let mut effect = codec::decode_sound_effect(&data)
            .with_context(|| format!("decoding {}", args.input.display()))?;

        if args.inspect {
            println!("{}", serde_json::to_string_pretty(&effect)?);
            return Ok(());
        }

        if args.trim {
            let trimmed = effect.calculate_delay();
            if trimmed != 0 {
                println!("Trimmed {} ms of shared start delay", trimmed * 20);
            }
        }

        let mut sound = effect.to_raw_sound();
        println!(
            "Mixed {} samples at {} Hz",
            sound.samples.len(),
            sound.sample_rate
        );

        if args.rate != sound.sample_rate {
            let decimator = Decimator::new(sound.sample_rate, args.rate);
            sound = sound.resample(&decimator);
            println!(
                "Resampled to {} samples at {} Hz",
                sound.samples.len(),
                sound.sample_rate
            );
        }

        let output = args
            .output
            .unwrap_or_else(|| args.input.with_extension("wav"));
        export_to_wav(&sound, &output)
            .with_context(|| format!("writing {}", output.display()))?;
        println!("Wrote {}", output.display());
        Ok(())
    }
}

#[cfg(all(feature = "synth-format", feature = "export-wav"))]
fn main() -> anyhow::Result<()> {
    cli::run()
}
